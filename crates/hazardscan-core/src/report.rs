//! Categorical aggregation of detection records into flat report rows.

use crate::taxonomy::Taxonomy;
use crate::types::{DetectionRecord, ReportRow};

/// Header of the filename column.
pub const IMAGE_COLUMN: &str = "Image";
/// Header of the detector labels column.
pub const OBJECTS_COLUMN: &str = "YOLO Objects";
/// Header of the optional per-image diagnostics column.
pub const DIAGNOSTICS_COLUMN: &str = "Diagnostics";

const CELL_SEPARATOR: &str = ", ";

/// Build the report row for one record.
///
/// Every category gets a cell, even when empty. Within a cell, tags keep the
/// record's score order. A retained tag that belongs to no category simply
/// appears in no cell.
pub fn build_row(record: &DetectionRecord, taxonomy: &Taxonomy) -> ReportRow {
    let categories = taxonomy
        .categories()
        .iter()
        .map(|category| {
            let members: Vec<&str> = record
                .tags
                .iter()
                .filter(|t| category.contains(&t.tag))
                .map(|t| t.tag.as_str())
                .collect();
            (category.name().to_string(), members.join(CELL_SEPARATOR))
        })
        .collect();

    ReportRow {
        image: record.file_name.clone(),
        categories,
        objects: record.objects.join(CELL_SEPARATOR),
        diagnostics: record.failures.iter().map(|f| f.to_string()).collect(),
    }
}

/// Column headers: `Image`, one per category in declared order, then objects.
pub fn columns(taxonomy: &Taxonomy, diagnostics: bool) -> Vec<String> {
    let mut headers = Vec::with_capacity(taxonomy.categories().len() + 3);
    headers.push(IMAGE_COLUMN.to_string());
    headers.extend(taxonomy.categories().iter().map(|c| c.name().to_string()));
    headers.push(OBJECTS_COLUMN.to_string());
    if diagnostics {
        headers.push(DIAGNOSTICS_COLUMN.to_string());
    }
    headers
}

impl ReportRow {
    /// Cells in the same order as [`columns`].
    pub fn cells(&self, diagnostics: bool) -> Vec<String> {
        let mut cells = Vec::with_capacity(self.categories.len() + 3);
        cells.push(self.image.clone());
        cells.extend(self.categories.iter().map(|(_, value)| value.clone()));
        cells.push(self.objects.clone());
        if diagnostics {
            cells.push(self.diagnostics.join("; "));
        }
        cells
    }

    /// The row as a flat JSON object keyed by column header.
    ///
    /// Diagnostics are included only when present.
    pub fn to_json_object(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut object = serde_json::Map::new();
        object.insert(IMAGE_COLUMN.to_string(), self.image.clone().into());
        for (name, value) in &self.categories {
            object.insert(name.clone(), value.clone().into());
        }
        object.insert(OBJECTS_COLUMN.to_string(), self.objects.clone().into());
        if !self.diagnostics.is_empty() {
            object.insert(
                DIAGNOSTICS_COLUMN.to_string(),
                self.diagnostics.clone().into(),
            );
        }
        object
    }
}
