//! Dataset to section mapping
//!
//! Tells the editor which tab has to refetch when a dataset changes.

/// Known datasets and the section (tab) that displays them
pub const TABLE_SECTIONS: &[(&str, &str)] = &[
    ("wbs_items", "wbs"),
    ("pricing_rows", "pricing"),
    ("proposed_people", "people"),
    ("scope_sections", "scope"),
    ("schedule_items", "schedule"),
    ("deliverables", "deliverables"),
    ("drawings", "drawings"),
];

/// Section showing `table`, or `None` for datasets no tab displays
#[must_use]
pub fn section_for_table(table: &str) -> Option<&'static str> {
    TABLE_SECTIONS
        .iter()
        .find(|(name, _)| *name == table)
        .map(|(_, section)| *section)
}
