use comfy_table::{presets::NOTHING, Attribute, Cell, CellAlignment, ContentArrangement, Table};
use corpora_core::catalog::SearchHit;
use corpora_core::model::Profile;

fn styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

pub fn display_profile(profile: &Profile) -> anyhow::Result<()> {
    let mut summary = styled_table();
    summary
        .add_row(vec![
            Cell::new("Dataset id").add_attribute(Attribute::Bold),
            profile.id.clone().into(),
        ])
        .add_row(vec![
            Cell::new("Name").add_attribute(Attribute::Bold),
            profile.name.clone().into(),
        ])
        .add_row(vec![
            Cell::new("Rows").add_attribute(Attribute::Bold),
            profile.nb_rows.to_string().into(),
        ])
        .add_row(vec![
            Cell::new("Size (bytes)").add_attribute(Attribute::Bold),
            profile.size_bytes.to_string().into(),
        ])
        .add_row(vec![
            Cell::new("Columns").add_attribute(Attribute::Bold),
            profile.columns.len().to_string().into(),
        ]);
    let column = summary.column_mut(0).unwrap();
    column.set_cell_alignment(CellAlignment::Right);
    println!("\n{summary}");

    let mut columns = styled_table();
    columns.set_header(vec![
        Cell::new("Column").add_attribute(Attribute::Bold),
        Cell::new("Structural type").add_attribute(Attribute::Bold),
        Cell::new("Semantic types").add_attribute(Attribute::Bold),
        Cell::new("Mean").add_attribute(Attribute::Bold),
        Cell::new("Stddev").add_attribute(Attribute::Bold),
        Cell::new("Missing ratio").add_attribute(Attribute::Bold),
    ]);
    for col in &profile.columns {
        columns.add_row(vec![
            col.name.clone(),
            col.structural_type
                .map(|t| format!("{t:?}"))
                .unwrap_or_else(|| "-".to_string()),
            col.semantic_types
                .iter()
                .map(|t| format!("{t:?}"))
                .collect::<Vec<_>>()
                .join(", "),
            col.mean.map(|v| format!("{v:.3}")).unwrap_or_default(),
            col.stddev.map(|v| format!("{v:.3}")).unwrap_or_default(),
            col.missing_values_ratio
                .map(|v| format!("{v:.3}"))
                .unwrap_or_default(),
        ]);
    }
    println!("\n{columns}");

    if !profile.spatial_coverage.is_empty() {
        let mut spatial = styled_table();
        spatial.set_header(vec![
            Cell::new("Lat column").add_attribute(Attribute::Bold),
            Cell::new("Lon column").add_attribute(Attribute::Bold),
            Cell::new("Envelopes").add_attribute(Attribute::Bold),
        ]);
        for coverage in &profile.spatial_coverage {
            spatial.add_row(vec![
                coverage.lat_column.clone(),
                coverage.lon_column.clone(),
                coverage.ranges.len().to_string(),
            ]);
        }
        println!("\n{spatial}");
    }

    Ok(())
}

pub fn display_profile_json(profile: &Profile) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(profile)?);
    Ok(())
}

pub fn display_search_hits(hits: &[SearchHit]) -> anyhow::Result<()> {
    if hits.is_empty() {
        println!("No matching datasets.");
        return Ok(());
    }
    let mut table = styled_table();
    table.set_header(vec![
        Cell::new("Dataset id").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
        Cell::new("Source").add_attribute(Attribute::Bold),
    ]);
    for hit in hits {
        table.add_row(vec![
            hit.id.clone(),
            format!("{:.3}", hit.score),
            hit.source.clone(),
        ]);
    }
    println!("\n{table}");
    Ok(())
}

pub fn display_purge_summary(identifier: &str, removed: &[String]) -> anyhow::Result<()> {
    println!(
        "Purged {} dataset(s) under identifier '{identifier}'",
        removed.len()
    );
    for id in removed {
        println!("  - {id}");
    }
    Ok(())
}
