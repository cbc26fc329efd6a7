use crate::error::LoadError;
use crate::load::{LoadOutcome, LoadRequest};
use crate::map::{Renderable, RenderableKind};
use crate::node::Source;
use crate::providers::{LoadContext, Provider};
use crate::transport::BoxFuture;

const LAT_ALIASES: [&str; 3] = ["lat", "latitude", "y"];
const LON_ALIASES: [&str; 5] = ["lon", "lng", "long", "longitude", "x"];

/// Point table summary: row count and the bounding box of parseable rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PointTable {
    pub rows: usize,
    pub extent: Option<[f64; 4]>,
}

/// Splits `text` into records. Quoted cells may hold commas, line breaks and
/// `""` escapes; unquoted cells are trimmed.
fn records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut was_quoted = false;
    let mut chars = text.chars().peekable();

    let finish_cell = |cell: &mut String, record: &mut Vec<String>, was_quoted: &mut bool| {
        let value = if *was_quoted {
            std::mem::take(cell)
        } else {
            let trimmed = cell.trim().to_string();
            cell.clear();
            trimmed
        };
        record.push(value);
        *was_quoted = false;
    };

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => quoted = false,
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' if cell.trim().is_empty() && !was_quoted => {
                cell.clear();
                quoted = true;
                was_quoted = true;
            }
            ',' => finish_cell(&mut cell, &mut record, &mut was_quoted),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                finish_cell(&mut cell, &mut record, &mut was_quoted);
                records.push(std::mem::take(&mut record));
            }
            // Whitespace after a closing quote.
            _ if was_quoted && c.is_whitespace() => {}
            _ => cell.push(c),
        }
    }
    if !cell.is_empty() || was_quoted || !record.is_empty() {
        finish_cell(&mut cell, &mut record, &mut was_quoted);
        records.push(record);
    }

    records.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    records
}

fn find_column(columns: &[String], aliases: &[&str]) -> Option<usize> {
    columns
        .iter()
        .position(|c| aliases.iter().any(|alias| *alias == c.as_str()))
}

/// Reads the header and rows of a CSV point table.
pub fn summarize(text: &str) -> Result<PointTable, String> {
    let mut rows_iter = records(text).into_iter();
    let header = rows_iter.next().ok_or("empty CSV")?;
    let columns: Vec<String> = header.into_iter().map(|c| c.to_lowercase()).collect();
    let lat = find_column(&columns, &LAT_ALIASES).ok_or("no latitude column")?;
    let lon = find_column(&columns, &LON_ALIASES).ok_or("no longitude column")?;

    let mut rows = 0;
    let mut extent: Option<[f64; 4]> = None;
    for cells in rows_iter {
        rows += 1;
        let parse = |i: usize| cells.get(i).and_then(|c| c.trim().parse::<f64>().ok());
        if let (Some(y), Some(x)) = (parse(lat), parse(lon)) {
            extent = Some(match extent {
                None => [x, y, x, y],
                Some([w, s, e, n]) => [w.min(x), s.min(y), e.max(x), n.max(y)],
            });
        }
    }
    Ok(PointTable { rows, extent })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvProvider;

impl Provider for CsvProvider {
    fn load<'a>(
        &'a self,
        ctx: &'a LoadContext<'a>,
        request: &'a LoadRequest,
    ) -> BoxFuture<'a, Result<LoadOutcome, LoadError>> {
        Box::pin(async move {
            let (url, text) = match &request.source {
                Source::Csv {
                    data: Some(data), url, ..
                } => (url.clone(), data.clone()),
                Source::Csv {
                    url: Some(url),
                    data: None,
                } => {
                    let text = ctx.transport.fetch_text(&ctx.outbound(request, url)).await?;
                    (Some(url.clone()), text)
                }
                _ => {
                    return Err(LoadError::format(
                        "",
                        format!("{} needs either `url` or `data`", request.id),
                    ));
                }
            };

            let origin = url.clone().unwrap_or_else(|| request.id.to_string());
            let table = summarize(&text).map_err(|message| LoadError::format(origin, message))?;

            let mut renderable = Renderable::new(RenderableKind::Csv);
            renderable.url = url;
            renderable.feature_count = Some(table.rows);
            renderable.extent = table.extent;
            Ok(LoadOutcome::Renderable(renderable))
        })
    }
}
