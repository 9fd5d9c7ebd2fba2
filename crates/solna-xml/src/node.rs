#![forbid(unsafe_code)]

//! Node-walking helpers shared by the KeyInfo handlers.

/// Iterate the element children of a node, in document order.
pub fn element_children<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

/// First element child, if any.
pub fn first_element_child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
) -> Option<roxmltree::Node<'a, 'input>> {
    element_children(node).next()
}

/// Next element sibling, if any.
pub fn next_element_sibling<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
) -> Option<roxmltree::Node<'a, 'input>> {
    let mut cur = node.next_sibling();
    while let Some(n) = cur {
        if n.is_element() {
            return Some(n);
        }
        cur = n.next_sibling();
    }
    None
}

/// Namespace URI of an element, with no namespace reported as `""`.
pub fn node_ns<'a>(node: &roxmltree::Node<'a, '_>) -> &'a str {
    node.tag_name().namespace().unwrap_or("")
}

/// Check that an element has the given local name and namespace.
pub fn check_node_name(node: roxmltree::Node<'_, '_>, name: &str, ns: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node_ns(&node) == ns
}

/// Concatenated text content of a node and its descendants, trimmed.
pub fn content_and_trim(node: roxmltree::Node<'_, '_>) -> String {
    let mut out = String::new();
    for d in node.descendants() {
        if d.is_text() {
            out.push_str(d.text().unwrap_or(""));
        }
    }
    out.trim().to_string()
}

/// True when a node has no element children and no non-blank text.
pub fn is_empty_node(node: roxmltree::Node<'_, '_>) -> bool {
    first_element_child(node).is_none() && content_and_trim(node).is_empty()
}

/// Escape text for use as XML element content.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Human-readable element description for error messages.
pub fn describe(node: roxmltree::Node<'_, '_>) -> String {
    let ns = node_ns(&node);
    if ns.is_empty() {
        node.tag_name().name().to_string()
    } else {
        format!("{{{ns}}}{}", node.tag_name().name())
    }
}
