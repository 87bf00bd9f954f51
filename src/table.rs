//! HTML table of a resolved reference list.

use crate::{ReferenceEntry, Result};
use itertools::Itertools;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

/// Attribute marking the table this crate owns inside a note.
pub const TABLE_ATTRIBUTE: &str = "data-citekey-table";

const HEADERS: [&str; 5] = ["#", "Citekey", "Title", "Authors", "Year"];

/// Renders `entries` as a `<table>`, one row per entry, all text escaped.
///
/// # Examples
///
/// ```
/// use citebind::ReferenceEntry;
/// use citebind::table::render_table;
///
/// let html = render_table(&[ReferenceEntry {
///     title: "Fast & Accurate".to_string(),
///     ..Default::default()
/// }])
/// .unwrap();
/// assert!(html.contains("<td>Fast &amp; Accurate</td>"));
/// ```
pub fn render_table(entries: &[ReferenceEntry]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());

    writer.write_event(Event::Start(
        BytesStart::new("table").with_attributes([(TABLE_ATTRIBUTE, "1")]),
    ))?;

    writer.write_event(Event::Start(BytesStart::new("thead")))?;
    write_row(&mut writer, "th", HEADERS.iter().map(|h| h.to_string()))?;
    writer.write_event(Event::End(BytesEnd::new("thead")))?;

    writer.write_event(Event::Start(BytesStart::new("tbody")))?;
    for (number, entry) in entries.iter().enumerate() {
        let cells = [
            (number + 1).to_string(),
            entry.citekey.clone().unwrap_or_default(),
            entry.title.clone(),
            entry.author.iter().join("; "),
            entry.year_text(),
        ];
        write_row(&mut writer, "td", cells.into_iter())?;
    }
    writer.write_event(Event::End(BytesEnd::new("tbody")))?;

    writer.write_event(Event::End(BytesEnd::new("table")))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| crate::CitekeyError::Render(e.to_string()))
}

fn write_row(
    writer: &mut Writer<Vec<u8>>,
    cell: &str,
    values: impl Iterator<Item = String>,
) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("tr")))?;
    for value in values {
        writer.write_event(Event::Start(BytesStart::new(cell)))?;
        if !value.is_empty() {
            writer.write_event(Event::Text(BytesText::new(&value)))?;
        }
        writer.write_event(Event::End(BytesEnd::new(cell)))?;
    }
    writer.write_event(Event::End(BytesEnd::new("tr")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Authors;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_table() {
        let entries = vec![
            ReferenceEntry {
                title: "Conditional DETR".to_string(),
                author: Authors::Many(vec!["Depu Meng".to_string(), "Xiaokang Chen".to_string()]),
                year: "2021".to_string(),
                citekey: Some("meng2021".to_string()),
                ..Default::default()
            },
            ReferenceEntry {
                title: "R&D <notes>".to_string(),
                ..Default::default()
            },
        ];

        assert_eq!(
            render_table(&entries).unwrap(),
            concat!(
                r#"<table data-citekey-table="1">"#,
                "<thead><tr><th>#</th><th>Citekey</th><th>Title</th><th>Authors</th><th>Year</th></tr></thead>",
                "<tbody>",
                "<tr><td>1</td><td>meng2021</td><td>Conditional DETR</td><td>Depu Meng; Xiaokang Chen</td><td>2021</td></tr>",
                "<tr><td>2</td><td></td><td>R&amp;D &lt;notes&gt;</td><td></td><td></td></tr>",
                "</tbody></table>"
            )
        );
    }

    #[test]
    fn test_render_empty_table() {
        let html = render_table(&[]).unwrap();
        assert!(html.contains("<tbody></tbody>"));
    }
}
