use kuchiki::{Attribute, ExpandedName, NodeData, NodeRef};
use markup5ever::{LocalName, QualName, namespace_url, ns};

pub(crate) fn make_element(tag: &str, attributes: &[(&str, &str)]) -> NodeRef {
    NodeRef::new_element(
        QualName::new(None, ns!(html), LocalName::from(tag)),
        attributes.iter().map(|(name, value)| {
            (
                ExpandedName::new(ns!(), LocalName::from(*name)),
                Attribute {
                    prefix: None,
                    value: (*value).to_string(),
                },
            )
        }),
    )
}

/// Structural copy of a subtree. The pipeline never mutates caller-owned
/// markup; every transformation operates on a clone produced here.
pub(crate) fn deep_clone(node: &NodeRef) -> NodeRef {
    let copy = shallow_clone(node);
    for child in node.children() {
        copy.append(deep_clone(&child));
    }
    copy
}

fn shallow_clone(node: &NodeRef) -> NodeRef {
    match node.data() {
        NodeData::Element(el) => NodeRef::new_element(
            el.name.clone(),
            el.attributes
                .borrow()
                .map
                .iter()
                .map(|(name, attr)| (name.clone(), attr.clone())),
        ),
        NodeData::Text(contents) => NodeRef::new_text(contents.borrow().clone()),
        NodeData::Comment(contents) => NodeRef::new_comment(contents.borrow().clone()),
        NodeData::ProcessingInstruction(contents) => {
            let contents = contents.borrow();
            NodeRef::new_processing_instruction(contents.0.clone(), contents.1.clone())
        }
        NodeData::Doctype(doctype) => NodeRef::new_doctype(
            doctype.name.clone(),
            doctype.public_id.clone(),
            doctype.system_id.clone(),
        ),
        NodeData::Document(_) | NodeData::DocumentFragment => NodeRef::new_document(),
    }
}

pub(crate) fn select_nodes(root: &NodeRef, selector: &str) -> Vec<NodeRef> {
    match root.select(selector) {
        Ok(matches) => matches.map(|m| m.as_node().clone()).collect(),
        Err(()) => Vec::new(),
    }
}

pub(crate) fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element()
        .map(|el| el.name.local.as_ref().to_ascii_lowercase())
}

pub(crate) fn get_attr(node: &NodeRef, name: &str) -> Option<String> {
    let el = node.as_element()?;
    let attributes = el.attributes.borrow();
    attributes.get(name).map(str::to_string)
}

pub(crate) fn set_attr(node: &NodeRef, name: &str, value: &str) {
    if let Some(el) = node.as_element() {
        el.attributes.borrow_mut().insert(name, value.to_string());
    }
}

pub(crate) fn remove_attr(node: &NodeRef, name: &str) {
    if let Some(el) = node.as_element() {
        el.attributes.borrow_mut().remove(name);
    }
}

pub(crate) fn classes(node: &NodeRef) -> Vec<String> {
    get_attr(node, "class")
        .map(|value| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub(crate) fn has_class(node: &NodeRef, name: &str) -> bool {
    classes(node).iter().any(|class| class == name)
}

pub(crate) fn set_classes(node: &NodeRef, classes: &[String]) {
    if classes.is_empty() {
        remove_attr(node, "class");
    } else {
        set_attr(node, "class", &classes.join(" "));
    }
}

pub(crate) fn add_class(node: &NodeRef, name: &str) {
    let mut current = classes(node);
    if !current.iter().any(|class| class == name) {
        current.push(name.to_string());
        set_classes(node, &current);
    }
}

/// Parses the inline `style` attribute into (property, value) declarations.
pub(crate) fn style_declarations(node: &NodeRef) -> Vec<(String, String)> {
    let Some(style) = get_attr(node, "style") else {
        return Vec::new();
    };
    style
        .split(';')
        .filter_map(|declaration| {
            let (prop, value) = declaration.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            if prop.is_empty() || value.is_empty() {
                None
            } else {
                Some((prop, value))
            }
        })
        .collect()
}

/// Upserts inline declarations, preserving unrelated ones in place.
pub(crate) fn set_styles(node: &NodeRef, declarations: &[(&str, &str)]) {
    let mut current = style_declarations(node);
    for (prop, value) in declarations {
        match current.iter_mut().find(|(p, _)| p == prop) {
            Some(slot) => slot.1 = (*value).to_string(),
            None => current.push(((*prop).to_string(), (*value).to_string())),
        }
    }
    let rendered = current
        .iter()
        .map(|(prop, value)| format!("{}: {}", prop, value))
        .collect::<Vec<_>>()
        .join("; ");
    set_attr(node, "style", &rendered);
}

pub(crate) fn inline_style(node: &NodeRef, property: &str) -> Option<String> {
    style_declarations(node)
        .into_iter()
        .find(|(prop, _)| prop == property)
        .map(|(_, value)| value)
}

pub(crate) fn owning_document(node: &NodeRef) -> Option<NodeRef> {
    node.ancestors()
        .find(|ancestor| matches!(ancestor.data(), NodeData::Document(_)))
}

pub(crate) fn document_body(document: &NodeRef) -> Option<NodeRef> {
    document
        .select_first("body")
        .ok()
        .map(|body| body.as_node().clone())
}

pub(crate) fn find_by_id(root: &NodeRef, id: &str) -> Option<NodeRef> {
    root.inclusive_descendants().find(|node| {
        get_attr(node, "id")
            .map(|value| value == id)
            .unwrap_or(false)
    })
}

pub(crate) fn serialize_html(node: &NodeRef) -> String {
    let mut bytes = Vec::new();
    let _ = node.serialize(&mut bytes);
    String::from_utf8_lossy(&bytes).into_owned()
}
