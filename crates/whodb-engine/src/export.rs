use std::io::Write;

use tracing::info;

use whodb_core::{Category, Condition, Error, Page, Result, Sort};

use crate::facade::Facade;

fn csv_error(err: csv::Error) -> Error {
    Error::Io(err.to_string())
}

/// Page through `unit` and write header plus text-codec cells as CSV.
///
/// NULL cells are written as empty fields. Pages are ordered by the unit's
/// identity columns so offsets stay stable between round trips.
pub async fn write_csv<W: Write + Send>(
    facade: &Facade,
    unit: &str,
    conditions: &[Condition],
    writer: W,
) -> Result<u64> {
    let columns = facade.columns(unit).await?;
    let sort: Vec<Sort> = match facade.category() {
        Category::KeyValue => Vec::new(),
        Category::Document => vec![Sort::asc(whodb_core::schema::DOCUMENT_ID_FIELD)],
        Category::Sql => columns
            .iter()
            .filter(|column| column.primary_key)
            .map(|column| Sort::asc(column.name.clone()))
            .collect(),
    };
    let page_size = facade.config().export_page_size.max(1);

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    let mut first_header: Option<Vec<String>> = None;
    let mut offset = 0u64;
    let mut written = 0u64;

    loop {
        let page = facade
            .query(unit, conditions, &sort, Some(Page::new(offset, page_size)))
            .await?;
        if first_header.is_none() {
            writer.write_record(&page.columns).map_err(csv_error)?;
        }
        let header = first_header.get_or_insert_with(|| page.columns.clone());

        let fetched = page.rows.len() as u64;
        for row in &page.rows {
            let record: Vec<String> = header
                .iter()
                .map(|column| {
                    row.get(column)
                        .and_then(|value| value.to_text())
                        .unwrap_or_default()
                })
                .collect();
            writer.write_record(&record).map_err(csv_error)?;
        }
        written += fetched;
        offset += fetched;
        if fetched < page_size {
            break;
        }
    }

    writer.flush().map_err(|err| Error::Io(err.to_string()))?;
    info!(event = "export.csv", unit = %unit, rows = written);
    Ok(written)
}
