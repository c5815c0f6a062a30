//! Cell and section helpers over shape elements.
//!
//! Visio stores scalar shape state as `<Cell N="..." V="..."/>` children and
//! grouped state as `<Section N="..."><Row .../></Section>`. Values are read
//! defensively: a missing or non-numeric cell yields the caller's default
//! instead of failing the extraction.

use crate::xml::Element;

pub fn cell_value<'a>(shape: &'a Element, name: &str) -> Option<&'a str> {
    shape
        .children_named("Cell")
        .find(|c| c.attr("N") == Some(name))
        .and_then(|c| c.attr("V"))
}

pub fn has_cell(shape: &Element, name: &str) -> bool {
    shape
        .children_named("Cell")
        .any(|c| c.attr("N") == Some(name))
}

pub fn cell_f64(shape: &Element, name: &str, default: f64) -> f64 {
    cell_value(shape, name)
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

/// Set a cell value, clearing any formula so the explicit value wins; the
/// cell is created at the front of the shape when absent (connectors can
/// lack Begin/End cells until they are materialized).
pub fn set_cell(shape: &mut Element, name: &str, value: &str) {
    for cell in shape.children_named_mut("Cell") {
        if cell.attr("N") == Some(name) {
            cell.set_attr("V", value);
            cell.remove_attr("F");
            return;
        }
    }
    let mut cell = Element::new("Cell");
    cell.set_attr("N", name);
    cell.set_attr("V", value);
    shape.children.insert(0, crate::xml::Node::Element(cell));
}

pub fn set_cell_f64(shape: &mut Element, name: &str, value: f64) {
    set_cell(shape, name, &format_number(value));
}

pub fn remove_cell(shape: &mut Element, name: &str) {
    shape.retain_elements(|el| !(el.has_local_name("Cell") && el.attr("N") == Some(name)));
}

/// Remove `<Section N="...">` children whose name is in `names`.
pub fn remove_sections(shape: &mut Element, names: &[&str]) {
    shape.retain_elements(|el| {
        !(el.has_local_name("Section")
            && el.attr("N").is_some_and(|n| names.contains(&n)))
    });
}

pub fn section<'a>(shape: &'a Element, name: &str) -> Option<&'a Element> {
    shape
        .children_named("Section")
        .find(|s| s.attr("N") == Some(name))
}

pub fn section_mut<'a>(shape: &'a mut Element, name: &str) -> Option<&'a mut Element> {
    shape
        .children_named_mut("Section")
        .find(|s| s.attr("N") == Some(name))
}

/// Value cell of a named row inside a named section, e.g. the
/// `visHeadingText` user row.
pub fn section_row_value<'a>(shape: &'a Element, section_name: &str, row_name: &str) -> Option<&'a str> {
    let section = section(shape, section_name)?;
    let row = section
        .children_named("Row")
        .find(|r| r.attr("N") == Some(row_name))?;
    row.children_named("Cell")
        .find(|c| c.attr("N") == Some("Value"))
        .and_then(|c| c.attr("V"))
}

/// Insert or replace a named row with a single `Value` cell in a section,
/// creating the section when absent.
pub fn set_section_row_value(shape: &mut Element, section_name: &str, row_name: &str, value: &str) {
    if section_mut(shape, section_name).is_none() {
        let mut s = Element::new("Section");
        s.set_attr("N", section_name);
        shape.push_element(s);
    }
    let section = section_mut(shape, section_name).expect("just ensured");

    for row in section.children_named_mut("Row") {
        if row.attr("N") == Some(row_name) {
            for cell in row.children_named_mut("Cell") {
                if cell.attr("N") == Some("Value") {
                    cell.set_attr("V", value);
                    cell.remove_attr("F");
                    return;
                }
            }
            let mut cell = Element::new("Cell");
            cell.set_attr("N", "Value");
            cell.set_attr("V", value);
            row.push_element(cell);
            return;
        }
    }

    let mut row = Element::new("Row");
    row.set_attr("N", row_name);
    let mut cell = Element::new("Cell");
    cell.set_attr("N", "Value");
    cell.set_attr("V", value);
    row.push_element(cell);
    section.push_element(row);
}

/// Render a coordinate the way Visio writes them: plain decimal, no
/// exponent, trimmed of a trailing `.0` only when integral.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let s = format!("{value:.6}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> Element {
        Element::parse(
            r#"<Shape ID="1" xmlns="http://schemas.microsoft.com/office/visio/2012/main">
                 <Cell N="PinX" V="2.5" F="Width*0.5"/>
                 <Cell N="Width" V="bad"/>
                 <Section N="Fill"><Row N="x"/></Section>
                 <Section N="User">
                   <Row N="visHeadingText"><Cell N="Value" V="财务部"/></Row>
                 </Section>
               </Shape>"#,
        )
        .unwrap()
    }

    #[test]
    fn defensive_numeric_reads() {
        let s = shape();
        assert_eq!(cell_f64(&s, "PinX", 0.0), 2.5);
        // Non-numeric value falls back to the documented default.
        assert_eq!(cell_f64(&s, "Width", 1.0), 1.0);
        assert_eq!(cell_f64(&s, "PinY", 0.0), 0.0);
    }

    #[test]
    fn set_cell_clears_formula_and_creates_missing() {
        let mut s = shape();
        set_cell_f64(&mut s, "PinX", 4.0);
        set_cell_f64(&mut s, "BeginX", 1.25);
        let pinx = s
            .children_named("Cell")
            .find(|c| c.attr("N") == Some("PinX"))
            .unwrap();
        assert_eq!(pinx.attr("V"), Some("4"));
        assert_eq!(pinx.attr("F"), None);
        assert_eq!(cell_f64(&s, "BeginX", 0.0), 1.25);
    }

    #[test]
    fn sections_and_user_rows() {
        let mut s = shape();
        assert_eq!(
            section_row_value(&s, "User", "visHeadingText"),
            Some("财务部")
        );
        remove_sections(&mut s, &["Fill"]);
        assert!(section(&s, "Fill").is_none());
        assert!(section(&s, "User").is_some());

        set_section_row_value(&mut s, "User", "visHeadingText", "部门负责人");
        assert_eq!(
            section_row_value(&s, "User", "visHeadingText"),
            Some("部门负责人")
        );
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(4.25), "4.25");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
    }
}
