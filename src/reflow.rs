use crate::dom;
use kuchiki::NodeRef;

pub(crate) const CHART_REGIONS: &str =
    ".chart-section, .chart-container-wrapper, .chart-container, .recharts-wrapper";

const ROW_STYLE: [(&str, &str); 5] = [
    ("display", "flex"),
    ("flex-wrap", "wrap"),
    ("justify-content", "space-between"),
    ("gap", "20px"),
    ("margin-bottom", "30px"),
];

const CHART_ITEM_STYLE: [(&str, &str); 4] = [
    ("flex", "1 1 45%"),
    ("min-width", "300px"),
    ("max-width", "48%"),
    ("page-break-inside", "avoid"),
];

/// Re-parents multiple chart regions into one wrapping flex row so print
/// output packs them side by side. A single chart keeps its natural position.
///
/// When the charts originally live under different parents, only the first
/// chart's parent receives the row. That asymmetry is inherited behavior
/// (see DESIGN.md) and is kept as is.
pub fn reflow_charts_for_print(root: &NodeRef) {
    let charts = outermost(dom::select_nodes(root, CHART_REGIONS));
    if charts.len() < 2 {
        return;
    }
    log::debug!("reflowing {} chart regions into a print row", charts.len());

    let row = dom::make_element("div", &[("class", "charts-container")]);
    dom::set_styles(&row, &ROW_STYLE);

    let host = charts[0].parent();
    for chart in &charts {
        dom::set_styles(chart, &CHART_ITEM_STYLE);
        chart.detach();
        row.append(chart.clone());
    }
    if let Some(host) = host {
        host.prepend(row);
    }
}

/// Chart classifications nest (a wrapper around a chart library mount also
/// matches); moving an inner match out of an outer one would gut the region,
/// so only outermost matches count as regions.
fn outermost(charts: Vec<NodeRef>) -> Vec<NodeRef> {
    charts
        .iter()
        .filter(|chart| !chart.ancestors().any(|ancestor| charts.contains(&ancestor)))
        .cloned()
        .collect()
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
    fn zero_or_one_chart_keeps_its_natural_position() {
        let root = fragment(
            r#"<div><div class="chart-section"><svg width="400" height="300"></svg></div></div>"#,
        );
        reflow_charts_for_print(&root);
        assert!(dom::select_nodes(&root, ".charts-container").is_empty());
        let chart = &dom::select_nodes(&root, ".chart-section")[0];
        assert!(dom::inline_style(chart, "flex").is_none());
    }

    #[test]
    fn two_charts_move_into_one_flex_row_in_document_order() {
        let root = fragment(
            r#"<div>
                 <div class="chart-section" id="bar"></div>
                 <div class="chart-container-wrapper" id="radar"></div>
                 <p id="summary">Unrelated content</p>
               </div>"#,
        );
        reflow_charts_for_print(&root);

        let rows = dom::select_nodes(&root, ".charts-container");
        assert_eq!(rows.len(), 1, "exactly one row container");

        let ids: Vec<_> = rows[0]
            .children()
            .filter_map(|child| dom::get_attr(&child, "id"))
            .collect();
        assert_eq!(ids, vec!["bar".to_string(), "radar".to_string()]);

        for chart in rows[0].children() {
            assert_eq!(dom::inline_style(&chart, "flex").as_deref(), Some("1 1 45%"));
            assert_eq!(dom::inline_style(&chart, "min-width").as_deref(), Some("300px"));
            assert_eq!(dom::inline_style(&chart, "max-width").as_deref(), Some("48%"));
        }

        // The row lands as the first child of the first chart's old parent,
        // ahead of unrelated content, which is untouched.
        let first_child = root.children().find(|c| c.as_element().is_some()).unwrap();
        assert!(dom::has_class(&first_child, "charts-container"));
        assert!(dom::find_by_id(&root, "summary").is_some());
    }

    #[test]
    fn charts_under_different_parents_join_the_first_parent_row() {
        let root = fragment(
            r#"<div>
                 <section id="left"><div class="chart-section" id="a"></div></section>
                 <section id="right"><div class="chart-section" id="b"></div></section>
               </div>"#,
        );
        reflow_charts_for_print(&root);

        let left = dom::find_by_id(&root, "left").unwrap();
        let rows = dom::select_nodes(&left, ".charts-container");
        assert_eq!(rows.len(), 1, "row lives under the first chart's parent");
        assert_eq!(rows[0].children().count(), 2);

        let right = dom::find_by_id(&root, "right").unwrap();
        assert!(dom::select_nodes(&right, ".chart-section").is_empty());
    }

    #[test]
    fn nested_chart_markers_count_as_one_region() {
        let root = fragment(
            r#"<div>
                 <div class="chart-container" id="outer"><div class="recharts-wrapper"></div></div>
                 <div class="chart-section" id="second"></div>
               </div>"#,
        );
        reflow_charts_for_print(&root);

        let rows = dom::select_nodes(&root, ".charts-container");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].children().count(), 2);
        let outer = dom::find_by_id(&root, "outer").unwrap();
        assert_eq!(
            dom::select_nodes(&outer, ".recharts-wrapper").len(),
            1,
            "inner chart mount stays inside its region"
        );
    }
}
