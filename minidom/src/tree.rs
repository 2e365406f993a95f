// Copyright (c) 2020 lumi <lumi@pew.im>
// Copyright (c) 2020 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `Node` tree: a small DOM tailored to the subset of XML that shows up
//! on an XMPP stream.
//!
//! Nodes live in a flat arena (`Vec<NodeData>`) owned by the `Node` that was
//! built or parsed; children are owning edges (`Payload::Element(NodeId)`)
//! and the `parent` back-reference is a plain index into that same arena,
//! never an owning pointer. This sidesteps `Rc`/`Weak` bookkeeping while
//! still giving every node a way to walk up to its root, which is what
//! namespace resolution (`namespace()`, `nsmap()`) needs.

use std::fmt;

/// Index of a node within a `Node`'s arena.
pub type NodeId = usize;

/// Either a child element or a run of text, in document order.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A child element, referenced by its arena index.
    Element(NodeId),
    /// A text run. Trimmed of leading/trailing whitespace on insertion.
    Text(String),
}

/// Borrowed view of one payload slot, for traversal that needs elements and
/// text runs in their original interleaved order (serialization).
pub(crate) enum PayloadItem<'a> {
    Element(NodeRef<'a>),
    Text(&'a str),
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub tag: String,
    pub prefix: Option<String>,
    pub nsmap_local: Vec<(Option<String>, String)>,
    pub attrs: Vec<(String, String)>,
    pub payload: Vec<Payload>,
    pub parent: Option<NodeId>,
}

/// A tree element, the DOM building block for this crate.
///
/// A `Node` owns its whole subtree: every descendant lives in the same
/// arena. Extracting a child as a free-standing `Node` (see
/// [`NodeRef::to_owned_node`]) copies just that subtree into a fresh arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) arena: Vec<NodeData>,
    pub(crate) root: NodeId,
}

impl Node {
    /// Splits `"prefix:local"` into `(Some(prefix), local)`, or
    /// `(None, name)` if there is no colon.
    pub(crate) fn split_name(name: &str) -> (Option<String>, String) {
        match name.split_once(':') {
            Some((prefix, local)) => (Some(prefix.to_owned()), local.to_owned()),
            None => (None, name.to_owned()),
        }
    }

    /// Builds a bare, childless node named `name` (which may be
    /// `"prefix:tag"`), with attributes already separated from any
    /// `xmlns*` declarations.
    pub fn new(name: &str, attrs: Vec<(String, String)>) -> Node {
        let (prefix, tag) = Self::split_name(name);
        let mut nsmap_local = Vec::new();
        let mut real_attrs = Vec::new();
        for (k, v) in attrs {
            if let Some(rest) = k.strip_prefix("xmlns") {
                let prefix = match rest.strip_prefix(':') {
                    Some(p) => Some(p.to_owned()),
                    None if rest.is_empty() => None,
                    None => {
                        // Attribute merely starts with "xmlns" (e.g.
                        // "xmlnsfoo"); not a namespace declaration.
                        real_attrs.push((k, v));
                        continue;
                    }
                };
                nsmap_local.push((prefix, v));
            } else {
                real_attrs.push((k, v));
            }
        }
        Node {
            arena: vec![NodeData {
                tag,
                prefix,
                nsmap_local,
                attrs: real_attrs,
                payload: Vec::new(),
                parent: None,
            }],
            root: 0,
        }
    }

    /// Builds a bare node with no attributes, for programmatic construction
    /// (e.g. assembling a BOSH `<body/>` envelope).
    pub fn bare(name: &str) -> Node {
        Node::new(name, Vec::new())
    }

    fn data(&self) -> &NodeData {
        &self.arena[self.root]
    }

    fn data_mut(&mut self) -> &mut NodeData {
        &mut self.arena[self.root]
    }

    /// Unqualified local name.
    pub fn tag(&self) -> &str {
        &self.data().tag
    }

    /// Namespace prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.data().prefix.as_deref()
    }

    /// Sets (or clears) the namespace prefix.
    pub fn set_prefix(&mut self, prefix: Option<String>) {
        self.data_mut().prefix = prefix;
    }

    /// Sets an attribute, overwriting any existing value for `key`.
    /// `xmlns*` keys are rejected; use [`Node::declare_ns`] instead.
    pub fn set_attr(&mut self, key: impl Into<String>, val: impl Into<String>) {
        let key = key.into();
        debug_assert!(
            !key.starts_with("xmlns"),
            "xmlns* attributes must go through declare_ns"
        );
        let val = val.into();
        let data = self.data_mut();
        if let Some(existing) = data.attrs.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = val;
        } else {
            data.attrs.push((key, val));
        }
    }

    /// Declares a namespace at this node: `None` for the default namespace,
    /// `Some(prefix)` for a prefixed one.
    pub fn declare_ns(&mut self, prefix: Option<String>, uri: impl Into<String>) {
        let uri = uri.into();
        let data = self.data_mut();
        if let Some(existing) = data.nsmap_local.iter_mut().find(|(p, _)| *p == prefix) {
            existing.1 = uri;
        } else {
            data.nsmap_local.push((prefix, uri));
        }
    }

    /// Convenience: declares the default namespace for this node.
    pub fn set_namespace(&mut self, uri: impl Into<String>) {
        self.declare_ns(None, uri);
    }

    /// Looks up an attribute by exact name.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.data()
            .attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates attributes in declaration order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data().attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Appends a text run, trimmed of surrounding whitespace. No-op if the
    /// trimmed text is empty.
    pub fn append_text(&mut self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let root = self.root;
        self.arena[root].payload.push(Payload::Text(trimmed.to_owned()));
    }

    /// Appends a trimmed text run to an arbitrary node in this arena. Used
    /// by the incremental parser, which tracks the currently-open element
    /// by id rather than always the root.
    pub(crate) fn append_text_at(&mut self, id: NodeId, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        self.arena[id].payload.push(Payload::Text(trimmed.to_owned()));
    }

    /// Appends `child` as a child of an arbitrary node in this arena
    /// (rather than always the root), returning the child's new id.
    pub(crate) fn append_child_at(&mut self, parent: NodeId, mut child: Node) -> NodeId {
        let offset = self.arena.len();
        for nd in child.arena.iter_mut() {
            if let Some(p) = nd.parent.as_mut() {
                *p += offset;
            }
            for item in nd.payload.iter_mut() {
                if let Payload::Element(id) = item {
                    *id += offset;
                }
            }
        }
        let child_root = child.root + offset;
        self.arena.extend(child.arena);
        self.arena[child_root].parent = Some(parent);
        self.arena[parent].payload.push(Payload::Element(child_root));
        child_root
    }

    /// Merges `child`'s whole arena into `self`'s, appending it as a child
    /// of `self`'s root, and returns the child's new id within `self`.
    pub fn append_child(&mut self, mut child: Node) -> NodeId {
        let offset = self.arena.len();
        for nd in child.arena.iter_mut() {
            if let Some(p) = nd.parent.as_mut() {
                *p += offset;
            }
            for item in nd.payload.iter_mut() {
                if let Payload::Element(id) = item {
                    *id += offset;
                }
            }
        }
        let child_root = child.root + offset;
        self.arena.extend(child.arena);
        self.arena[child_root].parent = Some(self.root);
        self.arena[self.root].payload.push(Payload::Element(child_root));
        child_root
    }

    /// Builder-style variant of [`Node::append_child`].
    pub fn with_child(mut self, child: Node) -> Self {
        self.append_child(child);
        self
    }

    /// Builder-style variant of [`Node::set_attr`].
    pub fn with_attr(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.set_attr(key, val);
        self
    }

    /// Builder-style variant of [`Node::declare_ns`].
    pub fn with_ns(mut self, prefix: Option<String>, uri: impl Into<String>) -> Self {
        self.declare_ns(prefix, uri);
        self
    }

    /// A read-only view rooted at this node.
    pub fn as_ref(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: self.root,
        }
    }

    /// Direct children that are elements (not text).
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.as_ref().children()
    }

    /// Direct children named `tag`.
    pub fn get_child(&self, tag: &str) -> Option<NodeRef<'_>> {
        self.as_ref().get_child(tag)
    }

    /// Direct text runs, in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.as_ref().texts()
    }

    /// All direct text runs concatenated.
    pub fn text(&self) -> String {
        self.as_ref().text()
    }

    /// The namespace URI that applies to this node: its own `nsmap_local`
    /// entry for its prefix if present, else the nearest ancestor's.
    pub fn namespace(&self) -> Option<&str> {
        self.as_ref().namespace()
    }

    /// The full namespace map visible at this node: every ancestor's
    /// `nsmap_local`, overlaid with this node's own, root to leaf.
    pub fn nsmap(&self) -> Vec<(Option<String>, String)> {
        self.as_ref().nsmap()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::serializer::to_string(self))
    }
}

/// A read-only, borrowed view of a node inside some `Node`'s arena.
///
/// Unlike `Node`, a `NodeRef` is cheap to copy (it is just a reference plus
/// an index) and can walk to its parent without cloning anything.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a Node,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    /// Builds a view of the node at `id` within `tree`'s arena. Used by the
    /// incremental parser to hand a borrowed view to start/end handlers
    /// without exposing arena internals outside the crate.
    pub(crate) fn new(tree: &'a Node, id: NodeId) -> NodeRef<'a> {
        NodeRef { tree, id }
    }

    fn data(&self) -> &'a NodeData {
        &self.tree.arena[self.id]
    }

    /// `"prefix:tag"` if prefixed, else just `"tag"`.
    pub(crate) fn qualified_name(&self) -> String {
        match self.prefix() {
            Some(p) => format!("{}:{}", p, self.tag()),
            None => self.tag().to_owned(),
        }
    }

    /// Unqualified local name.
    pub fn tag(&self) -> &'a str {
        &self.data().tag
    }

    /// Namespace prefix, if any.
    pub fn prefix(&self) -> Option<&'a str> {
        self.data().prefix.as_deref()
    }

    /// Looks up an attribute by exact name.
    pub fn attr(&self, key: &str) -> Option<&'a str> {
        self.data()
            .attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates attributes in declaration order.
    pub fn attrs(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.data().attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Direct children that are elements (not text), in document order.
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        self.data().payload.iter().filter_map(move |p| match p {
            Payload::Element(id) => Some(NodeRef { tree, id: *id }),
            Payload::Text(_) => None,
        })
    }

    /// The payload in document order, elements and text runs interleaved —
    /// what the serializer walks.
    pub(crate) fn payload_items(&self) -> impl Iterator<Item = PayloadItem<'a>> + 'a {
        let tree = self.tree;
        self.data().payload.iter().map(move |p| match p {
            Payload::Element(id) => PayloadItem::Element(NodeRef { tree, id: *id }),
            Payload::Text(t) => PayloadItem::Text(t.as_str()),
        })
    }

    /// `xmlns*` declarations made AT this node (not inherited).
    pub(crate) fn local_nsmap(&self) -> &'a [(Option<String>, String)] {
        &self.data().nsmap_local
    }

    /// True if this node has no payload at all (renders as `<tag/>`).
    pub(crate) fn is_empty(&self) -> bool {
        self.data().payload.is_empty()
    }

    /// The first direct child named `tag`, if any.
    pub fn get_child(&self, tag: &str) -> Option<NodeRef<'a>> {
        self.children().find(|c| c.tag() == tag)
    }

    /// Direct text runs, in order.
    pub fn texts(&self) -> impl Iterator<Item = &'a str> {
        self.data().payload.iter().filter_map(|p| match p {
            Payload::Text(t) => Some(t.as_str()),
            Payload::Element(_) => None,
        })
    }

    /// All direct text runs concatenated.
    pub fn text(&self) -> String {
        self.texts().collect::<Vec<_>>().join("")
    }

    /// The parent node, if this is not the root of its arena.
    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.data().parent.map(|id| NodeRef { tree: self.tree, id })
    }

    /// Copies this subtree out into a fresh, free-standing `Node` with its
    /// own arena starting at index 0.
    pub fn to_owned_node(&self) -> Node {
        // Collect the reachable subtree via a DFS, remapping ids as we go.
        let mut arena = Vec::new();
        let new_root = Self::copy_subtree(self.tree, self.id, &mut arena, None);
        Node { arena, root: new_root }
    }

    fn copy_subtree(
        tree: &Node,
        id: NodeId,
        out: &mut Vec<NodeData>,
        new_parent: Option<NodeId>,
    ) -> NodeId {
        let src = &tree.arena[id];
        let my_id = out.len();
        out.push(NodeData {
            tag: src.tag.clone(),
            prefix: src.prefix.clone(),
            nsmap_local: src.nsmap_local.clone(),
            attrs: src.attrs.clone(),
            payload: Vec::with_capacity(src.payload.len()),
            parent: new_parent,
        });
        let mut new_payload = Vec::with_capacity(src.payload.len());
        for item in &src.payload {
            match item {
                Payload::Text(t) => new_payload.push(Payload::Text(t.clone())),
                Payload::Element(child_id) => {
                    let new_child = Self::copy_subtree(tree, *child_id, out, Some(my_id));
                    new_payload.push(Payload::Element(new_child));
                }
            }
        }
        out[my_id].payload = new_payload;
        my_id
    }

    fn lookup_ns(&self, prefix: Option<&str>) -> Option<&'a str> {
        let mut cur = Some(*self);
        while let Some(n) = cur {
            if let Some((_, uri)) = n
                .data()
                .nsmap_local
                .iter()
                .find(|(p, _)| p.as_deref() == prefix)
            {
                return Some(uri.as_str());
            }
            cur = n.parent();
        }
        None
    }

    /// The namespace URI that applies to this node.
    pub fn namespace(&self) -> Option<&'a str> {
        self.lookup_ns(self.prefix())
    }

    /// The full namespace map visible at this node.
    pub fn nsmap(&self) -> Vec<(Option<String>, String)> {
        let mut chain = Vec::new();
        let mut cur = Some(*self);
        while let Some(n) = cur {
            chain.push(n);
            cur = n.parent();
        }
        let mut map: Vec<(Option<String>, String)> = Vec::new();
        for n in chain.into_iter().rev() {
            for (prefix, uri) in &n.data().nsmap_local {
                if let Some(existing) = map.iter_mut().find(|(p, _)| p == prefix) {
                    existing.1 = uri.clone();
                } else {
                    map.push((prefix.clone(), uri.clone()));
                }
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::serializer::to_string;

    fn parse_one(xml: &str) -> Node {
        let mut p = Parser::new("test");
        p.feed(xml.as_bytes()).unwrap();
        p.roots().pop().unwrap()
    }

    #[test]
    fn xmlns_attrs_are_split_into_nsmap_local() {
        let n = Node::new(
            "stream:features",
            vec![
                ("xmlns".into(), "jabber:client".into()),
                ("xmlns:stream".into(), "http://etherx.jabber.org/streams".into()),
                ("to".into(), "a@b".into()),
            ],
        );
        assert_eq!(n.attrs().collect::<Vec<_>>(), vec![("to", "a@b")]);
        assert_eq!(n.namespace(), Some("jabber:client"));
    }

    #[test]
    fn colon_in_tag_splits_prefix() {
        let n = Node::bare("stream:error");
        assert_eq!(n.prefix(), Some("stream"));
        assert_eq!(n.tag(), "error");
    }

    #[test]
    fn text_is_trimmed_on_insertion() {
        let mut n = Node::bare("body");
        n.append_text("  hello world  \n");
        assert_eq!(n.text(), "hello world");
    }

    #[test]
    fn empty_text_is_dropped() {
        let mut n = Node::bare("body");
        n.append_text("   \n\t  ");
        assert_eq!(n.texts().count(), 0);
    }

    #[test]
    fn namespace_resolves_through_ancestor_chain() {
        let mut outer = Node::bare("a");
        outer.declare_ns(None, "urn:outer");
        let mut inner = Node::bare("b");
        inner.declare_ns(Some("x".into()), "urn:inner-x");
        outer.append_child(inner);
        let b = outer.get_child("b").unwrap();
        assert_eq!(b.namespace(), Some("urn:outer"));
        assert_eq!(b.nsmap().iter().find(|(p, _)| p.is_none()).unwrap().1, "urn:outer");
        assert_eq!(
            b.nsmap().iter().find(|(p, _)| p.as_deref() == Some("x")).unwrap().1,
            "urn:inner-x"
        );
    }

    /// P1: re-parsing a serialized node yields a structurally equal tree —
    /// same tag, attributes (minus `xmlns*`), prefix, children in order,
    /// and resolved namespace.
    #[test]
    fn serialize_round_trips_structurally() {
        let original = parse_one(
            "<stream:features xmlns:stream='http://etherx.jabber.org/streams'>\
               <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
                 <mechanism>PLAIN</mechanism>\
               </mechanisms>\
             </stream:features>",
        );
        let serialized = to_string(&original);
        let reparsed = parse_one(&serialized);

        assert_eq!(original.tag(), reparsed.tag());
        assert_eq!(original.prefix(), reparsed.prefix());
        assert_eq!(original.namespace(), reparsed.namespace());

        let orig_mechanisms = original.get_child("mechanisms").unwrap();
        let reparsed_mechanisms = reparsed.get_child("mechanisms").unwrap();
        assert_eq!(orig_mechanisms.namespace(), reparsed_mechanisms.namespace());
        assert_eq!(
            orig_mechanisms.get_child("mechanism").unwrap().text(),
            reparsed_mechanisms.get_child("mechanism").unwrap().text()
        );
    }

    #[test]
    fn to_owned_node_copies_whole_subtree_with_remapped_ids() {
        let parent = parse_one("<a><b><c/></b><b><d/></b></a>");
        let first_b = parent.children().next().unwrap();
        let owned = first_b.to_owned_node();
        assert_eq!(owned.tag(), "b");
        assert_eq!(owned.children().count(), 1);
        assert_eq!(owned.children().next().unwrap().tag(), "c");
    }
}
