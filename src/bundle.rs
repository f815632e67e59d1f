use std::fs;

use camino::Utf8Path;
use tracing::{debug, info};

use crate::error::MasstError;
use crate::fs_util::write_string_atomic;

pub const TREE_DATA_PLACEHOLDER: &str = "PLACEHOLDER_JSON_DATA";
pub const LIBRARY_DATA_PLACEHOLDER: &str = "LIBRARY_JSON_DATA_PLACEHOLDER";
pub const INPUT_LABEL_PLACEHOLDER: &str = "INPUT_LABEL_PLACEHOLDER";
pub const USI_LABEL_PLACEHOLDER: &str = "USI_LABEL_PLACEHOLDER";
pub const PARAMS_PLACEHOLDER: &str = "PARAMS_PLACEHOLDER";

/// Values substituted into a page template.
#[derive(Debug, Clone, Default)]
pub struct PageData<'a> {
    pub tree_json: &'a str,
    pub library_json: &'a str,
    pub input_label: &'a str,
    pub usi_label: &'a str,
    pub params_label: &'a str,
}

impl PageData<'_> {
    fn replacements(&self) -> [(&'static str, &str); 5] {
        [
            (TREE_DATA_PLACEHOLDER, self.tree_json),
            (LIBRARY_DATA_PLACEHOLDER, self.library_json),
            (INPUT_LABEL_PLACEHOLDER, self.input_label),
            (USI_LABEL_PLACEHOLDER, self.usi_label),
            (PARAMS_PLACEHOLDER, self.params_label),
        ]
    }
}

/// Replace the first occurrence of every placeholder.
pub fn render_page(template: &str, data: &PageData<'_>) -> String {
    let mut page = template.to_string();
    for (placeholder, value) in data.replacements() {
        match page.find(placeholder) {
            Some(start) => page.replace_range(start..start + placeholder.len(), value),
            None => debug!(placeholder, "template has no placeholder"),
        }
    }
    page
}

pub fn write_page(
    template: &Utf8Path,
    output: &Utf8Path,
    data: &PageData<'_>,
) -> Result<(), MasstError> {
    let content = fs::read_to_string(template.as_std_path())
        .map_err(|err| MasstError::Filesystem(format!("read template {template}: {err}")))?;
    write_string_atomic(output, &render_page(&content, data))?;
    info!(path = %output, "wrote page");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_first_occurrence_only() {
        let template = "var tree = PLACEHOLDER_JSON_DATA; // PLACEHOLDER_JSON_DATA\n\
                        <h1>INPUT_LABEL_PLACEHOLDER</h1><p>PARAMS_PLACEHOLDER</p>";
        let page = render_page(
            template,
            &PageData {
                tree_json: r#"{"name":"root"}"#,
                input_label: "caffeic acid",
                params_label: "min cosine: 0.7",
                ..PageData::default()
            },
        );
        assert_eq!(
            page,
            "var tree = {\"name\":\"root\"}; // PLACEHOLDER_JSON_DATA\n\
             <h1>caffeic acid</h1><p>min cosine: 0.7</p>"
        );
    }

    #[test]
    fn missing_placeholders_are_skipped() {
        let page = render_page(
            "<p>USI_LABEL_PLACEHOLDER</p>",
            &PageData {
                usi_label: "mzspec:GNPS:GNPS-LIBRARY:accession:CCMSLIB00005883671",
                ..PageData::default()
            },
        );
        assert_eq!(page, "<p>mzspec:GNPS:GNPS-LIBRARY:accession:CCMSLIB00005883671</p>");
    }
}
