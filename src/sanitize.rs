use crate::dom;
use kuchiki::NodeRef;

const INTERACTIVE_CONTROLS: &str =
    "button, .btn, [role=\"button\"], input[type=\"button\"], input[type=\"submit\"]";
const CONTENT_LINK_CLASSES: [&str; 2] = ["recommendation-link", "resource-link"];
const DROPDOWNS: &str = "select, .dropdown, .dropdown-menu, .dropdown-toggle";
const FEEDBACK_REGIONS: &str =
    ".feedback-section, .feedback-form, [id*=\"feedback\"], [class*=\"feedback\"]";
const SHARING_REGIONS: &str = ".share-button, .share-section, [id*=\"share\"], [class*=\"share\"]";
const TOGGLES: &str = ".toggle, .switch, [role=\"switch\"]";
const MODALS: &str = ".modal, dialog, [role=\"dialog\"], [aria-modal=\"true\"]";
const DISCLOSURES: &str = "details, summary, [aria-expanded]";
const DISCLOSURE_ATTRS: [&str; 5] = [
    "aria-expanded",
    "aria-controls",
    "aria-haspopup",
    "tabindex",
    "role",
];

/// Strips interactive and ephemeral nodes so the output reads as a static
/// document. Mutates the clone in place; the caller owns it exclusively.
/// A missing subtree is a no-op (call sites guard and report separately).
pub fn sanitize(target: Option<&NodeRef>) {
    let Some(root) = target else {
        return;
    };
    let mut removed = 0usize;

    // Controls nested in a content hyperlink carry navigable value in the
    // static document and survive; everything else interactive goes.
    for control in dom::select_nodes(root, INTERACTIVE_CONTROLS) {
        if !inside_content_link(&control) {
            control.detach();
            removed += 1;
        }
    }

    for selector in [DROPDOWNS, FEEDBACK_REGIONS, SHARING_REGIONS] {
        removed += detach_all(root, selector);
    }

    removed += detach_all(root, "form, textarea");
    for input in dom::select_nodes(root, "input") {
        let hidden = dom::get_attr(&input, "type")
            .map(|t| t.eq_ignore_ascii_case("hidden"))
            .unwrap_or(false);
        if !hidden {
            input.detach();
            removed += 1;
        }
    }

    removed += detach_all(root, TOGGLES);
    removed += detach_all(root, MODALS);

    for disclosure in dom::select_nodes(root, DISCLOSURES) {
        if dom::tag_name(&disclosure).as_deref() == Some("details") {
            dom::set_attr(&disclosure, "open", "true");
            dom::set_styles(&disclosure, &[("display", "block")]);
        }
        for attr in DISCLOSURE_ATTRS {
            dom::remove_attr(&disclosure, attr);
        }
        // Swap in a structurally identical copy: the original node may carry
        // live listener state in the host surface.
        let replacement = dom::deep_clone(&disclosure);
        disclosure.insert_before(replacement);
        disclosure.detach();
    }

    if removed > 0 {
        log::debug!("sanitizer detached {} interactive nodes", removed);
    }
}

fn detach_all(root: &NodeRef, selector: &str) -> usize {
    let nodes = dom::select_nodes(root, selector);
    let count = nodes.len();
    for node in nodes {
        node.detach();
    }
    count
}

fn inside_content_link(node: &NodeRef) -> bool {
    node.inclusive_ancestors().any(|ancestor| {
        if ancestor.as_element().is_none() {
            return false;
        }
        if dom::tag_name(&ancestor).as_deref() == Some("a")
            && dom::get_attr(&ancestor, "href").is_some()
        {
            return true;
        }
        CONTENT_LINK_CLASSES
            .iter()
            .any(|class| dom::has_class(&ancestor, class))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;

    fn fragment(html: &str) -> NodeRef {
        let doc = kuchiki::parse_html().one(format!("<html><body>{}</body></html>", html));
        doc.select_first("body > *")
            .expect("fragment root")
            .as_node()
            .clone()
    }

    #[test]
    fn sanitize_none_is_a_no_op() {
        sanitize(None);
    }

    #[test]
    fn interactive_controls_are_removed_exhaustively() {
        let root = fragment(
            r#"<div>
                 <button>Export</button>
                 <span class="btn">Again</span>
                 <div role="button">Fake</div>
                 <input type="submit" value="Send">
                 <select><option>a</option></select>
                 <form><textarea>notes</textarea><input type="text"></form>
                 <input type="hidden" name="token" value="x">
                 <label class="switch">Dark mode</label>
                 <div class="modal">overlay</div>
               </div>"#,
        );
        sanitize(Some(&root));

        for selector in ["button", ".btn", "[role=\"button\"]", "select", "form", "textarea"] {
            assert!(
                dom::select_nodes(&root, selector).is_empty(),
                "expected no {} after sanitization",
                selector
            );
        }
        assert!(dom::select_nodes(&root, ".switch").is_empty());
        assert!(dom::select_nodes(&root, ".modal").is_empty());
        let inputs = dom::select_nodes(&root, "input");
        assert_eq!(inputs.len(), 1, "only the hidden input survives");
        assert_eq!(dom::get_attr(&inputs[0], "type").as_deref(), Some("hidden"));
    }

    #[test]
    fn controls_inside_content_links_are_preserved() {
        let root = fragment(
            r#"<div>
                 <a href="https://doc.rust-lang.org/book/" class="recommendation-link">
                   <button>Open resource</button>
                 </a>
                 <button>Standalone</button>
               </div>"#,
        );
        sanitize(Some(&root));

        let buttons = dom::select_nodes(&root, "button");
        assert_eq!(buttons.len(), 1, "link call-to-action must survive");
        assert!(inside_content_link(&buttons[0]));
    }

    #[test]
    fn feedback_region_is_removed_and_sibling_recommendation_survives() {
        let root = fragment(
            r#"<div>
                 <div class="feedback-section"><form><textarea></textarea></form></div>
                 <div id="share-panel"><button class="share-button">Share</button></div>
                 <a href="/course/ownership" class="resource-link">
                   Ownership deep dive <button>Start</button>
                 </a>
               </div>"#,
        );
        sanitize(Some(&root));

        assert!(dom::select_nodes(&root, ".feedback-section").is_empty());
        assert!(dom::select_nodes(&root, "[id*=\"share\"]").is_empty());
        let link = dom::select_nodes(&root, "a");
        assert_eq!(link.len(), 1);
        assert_eq!(dom::select_nodes(&link[0], "button").len(), 1);
    }

    #[test]
    fn disclosures_are_expanded_and_stripped_of_interaction_attributes() {
        let root = fragment(
            r#"<div>
                 <details aria-expanded="false" tabindex="0"><summary>More</summary><p>body</p></details>
               </div>"#,
        );
        sanitize(Some(&root));

        let details = dom::select_nodes(&root, "details");
        assert_eq!(details.len(), 1);
        assert_eq!(dom::get_attr(&details[0], "open").as_deref(), Some("true"));
        assert!(dom::get_attr(&details[0], "aria-expanded").is_none());
        assert!(dom::get_attr(&details[0], "tabindex").is_none());
        assert_eq!(
            dom::select_nodes(&details[0], "p").len(),
            1,
            "disclosure content is kept"
        );
    }
}
