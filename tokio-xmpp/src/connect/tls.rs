//! In-place TLS upgrade shared by `starttls()` on the TCP transport and by
//! BOSH's `https://` connections.

use std::sync::Arc;
use std::sync::OnceLock;

use tokio_rustls::rustls::{pki_types::ServerName, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::connect::AsyncReadAndWrite;
use crate::error::{Error, TransportError};

fn root_store() -> &'static RootCertStore {
    static ROOTS: OnceLock<RootCertStore> = OnceLock::new();
    ROOTS.get_or_init(|| {
        let mut store = RootCertStore::empty();
        #[cfg(feature = "rustls-native-certs")]
        {
            let result = rustls_native_certs::load_native_certs();
            for err in &result.errors {
                log::debug!("skipping unreadable native root certificate: {}", err);
            }
            let (added, _ignored) = store.add_parsable_certificates(result.certs);
            log::debug!("loaded {} native root certificates", added);
        }
        #[cfg(feature = "webpki-roots")]
        {
            store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        store
    })
}

/// Wraps `stream` in a TLS session for `domain`, returning it re-boxed
/// behind the same [`AsyncReadAndWrite`] trait object it came in as. The
/// boxed socket underneath is untouched — only an additional layer wraps
/// it — so the caller's notion of "this connection" (its file descriptor)
/// doesn't change.
pub async fn upgrade(
    stream: Box<dyn AsyncReadAndWrite>,
    domain: &str,
) -> Result<Box<dyn AsyncReadAndWrite>, Error> {
    let config = ClientConfig::builder()
        .with_root_certificates(root_store().clone())
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(domain.to_owned())
        .map_err(|_| Error::Transport(TransportError::Disconnected))?;
    let tls_stream = connector.connect(server_name, stream).await?;
    Ok(Box::new(tls_stream))
}
