use crate::errors::AppError;
use crate::models::Homeowner;
use std::path::Path;

/// Write the final record set as CSV, a durability backup independent of
/// the primary store. Every cell is quoted.
pub fn write_csv(homeowners: &[Homeowner], path: &Path) -> Result<(), AppError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_path(path)?;

    writer.write_record([
        "Name",
        "Phone",
        "Address",
        "City",
        "State",
        "Zip",
        "Home Value",
        "Lot Size (sqft)",
        "Year Built",
        "Score",
        "Priority",
    ])?;

    for h in homeowners {
        let row: [String; 11] = [
            h.owner_name.clone(),
            h.phone.clone().unwrap_or_default(),
            h.address.clone(),
            h.city.clone(),
            h.state.clone(),
            h.zip.clone(),
            h.estimated_value.map(|v| format!("{v:.0}")).unwrap_or_default(),
            h.lot_sqft.map(|v| format!("{v:.0}")).unwrap_or_default(),
            h.year_built.map(|y| y.to_string()).unwrap_or_default(),
            h.score.map(|s| s.to_string()).unwrap_or_default(),
            h.priority.map(|p| p.to_string()).unwrap_or_default(),
        ];
        writer.write_record(&row)?;
    }

    writer.flush()?;
    tracing::info!("Exported {} records to {:?}", homeowners.len(), path);
    Ok(())
}
