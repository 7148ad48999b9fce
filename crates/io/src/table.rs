//! Header resolution and row assembly shared by the tabular loaders.

use fiscal_recon::config::ColumnOverrides;
use fiscal_recon::model::{RawRow, RawValue};

use crate::error::IoError;

/// Record fields a column can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Date,
    Series,
    Number,
    Value,
    TaxBase,
    TaxAmount,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Date,
        Field::Series,
        Field::Number,
        Field::Value,
        Field::TaxBase,
        Field::TaxAmount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Series => "series",
            Self::Number => "number",
            Self::Value => "value",
            Self::TaxBase => "tax_base",
            Self::TaxAmount => "tax_amount",
        }
    }

    /// Folded header spellings recognized for this field.
    fn synonyms(&self) -> &'static [&'static str] {
        match self {
            Self::Date => &[
                "date",
                "data",
                "emissao",
                "data emissao",
                "data de emissao",
                "dt emissao",
                "dhemi",
                "demi",
            ],
            Self::Series => &["series", "serie", "serie nf", "serie da nota"],
            Self::Number => &[
                "number",
                "numero",
                "nnf",
                "nota",
                "nf",
                "numero nf",
                "numero da nota",
                "numero nota",
                "num nf",
            ],
            Self::Value => &["value", "vnf", "valor total", "valor", "valor da nota", "valor nf", "total"],
            Self::TaxBase => &[
                "tax base",
                "vbc",
                "base icms",
                "base de calculo",
                "base de calculo icms",
                "bc icms",
            ],
            Self::TaxAmount => &["tax amount", "vicms", "icms", "valor icms", "valor do icms"],
        }
    }

    fn override_in<'a>(&self, overrides: &'a ColumnOverrides) -> Option<&'a str> {
        match self {
            Self::Date => overrides.date.as_deref(),
            Self::Series => overrides.series.as_deref(),
            Self::Number => overrides.number.as_deref(),
            Self::Value => overrides.value.as_deref(),
            Self::TaxBase => overrides.tax_base.as_deref(),
            Self::TaxAmount => overrides.tax_amount.as_deref(),
        }
    }

    fn required(&self) -> bool {
        matches!(self, Self::Series | Self::Number)
    }
}

/// Header comparison form: lowercase, accents folded, `_` `.` `:` read as
/// spaces, whitespace collapsed.
pub fn fold_header(header: &str) -> String {
    let folded: String = header
        .trim_start_matches('\u{feff}')
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            '_' | '.' | ':' => ' ',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Column index per field. `None` means the field is absent from the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: Option<usize>,
    pub series: Option<usize>,
    pub number: Option<usize>,
    pub value: Option<usize>,
    pub tax_base: Option<usize>,
    pub tax_amount: Option<usize>,
}

impl ColumnMap {
    fn set(&mut self, field: Field, index: usize) {
        let slot = match field {
            Field::Date => &mut self.date,
            Field::Series => &mut self.series,
            Field::Number => &mut self.number,
            Field::Value => &mut self.value,
            Field::TaxBase => &mut self.tax_base,
            Field::TaxAmount => &mut self.tax_amount,
        };
        *slot = Some(index);
    }
}

/// Map headers to fields. Overrides win over synonyms; an override naming a
/// header that does not exist is an error, as is a missing key column.
pub fn resolve_columns(
    headers: &[String],
    overrides: &ColumnOverrides,
    origin: &str,
) -> Result<ColumnMap, IoError> {
    let folded: Vec<String> = headers.iter().map(|h| fold_header(h)).collect();
    let mut map = ColumnMap::default();

    for field in Field::ALL {
        let index = match field.override_in(overrides) {
            Some(name) => {
                let wanted = fold_header(name);
                let found = folded.iter().position(|h| *h == wanted);
                if found.is_none() {
                    return Err(IoError::MissingColumn {
                        column: name.to_string(),
                        origin: origin.to_string(),
                    });
                }
                found
            }
            None => folded.iter().position(|h| field.synonyms().contains(&h.as_str())),
        };

        match index {
            Some(i) => map.set(field, i),
            None if field.required() => {
                return Err(IoError::MissingColumn {
                    column: field.name().to_string(),
                    origin: origin.to_string(),
                })
            }
            None => tracing::debug!("{origin}: no {} column", field.name()),
        }
    }

    Ok(map)
}

/// Assemble raw rows from body cells. Rows with no non-empty cell are skipped.
/// `first_line` is the 1-based line of the first body row, for origins.
pub fn assemble_rows(
    map: &ColumnMap,
    body: Vec<Vec<Option<RawValue>>>,
    origin: &str,
    first_line: usize,
) -> Vec<RawRow> {
    let cell = |cells: &[Option<RawValue>], index: Option<usize>| -> Option<RawValue> {
        index.and_then(|i| cells.get(i).cloned().flatten())
    };

    body.into_iter()
        .enumerate()
        .filter(|(_, cells)| cells.iter().any(Option::is_some))
        .map(|(i, cells)| RawRow {
            date: cell(&cells, map.date),
            series: cell(&cells, map.series),
            number: cell(&cells, map.number),
            value: cell(&cells, map.value),
            tax_base: cell(&cells, map.tax_base),
            tax_amount: cell(&cells, map.tax_amount),
            cancelled: false,
            origin: Some(format!("{origin}:{}", first_line + i)),
        })
        .collect()
}

/// Text cell, with blank text read as empty.
pub fn text_cell(s: &str) -> Option<RawValue> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(RawValue::Text(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fold_accents_and_case() {
        assert_eq!(fold_header("Número"), "numero");
        assert_eq!(fold_header("  Data de   Emissão "), "data de emissao");
        assert_eq!(fold_header("BASE_ICMS"), "base icms");
        assert_eq!(fold_header("\u{feff}Série"), "serie");
        assert_eq!(fold_header("Num. NF"), "num nf");
    }

    #[test]
    fn synonyms_resolve() {
        let h = headers(&["Emissão", "Série", "nNF", "Valor Total", "vBC", "Valor ICMS"]);
        let map = resolve_columns(&h, &ColumnOverrides::default(), "t.csv").unwrap();
        assert_eq!(map.date, Some(0));
        assert_eq!(map.series, Some(1));
        assert_eq!(map.number, Some(2));
        assert_eq!(map.value, Some(3));
        assert_eq!(map.tax_base, Some(4));
        assert_eq!(map.tax_amount, Some(5));
    }

    #[test]
    fn optional_columns_may_be_missing() {
        let h = headers(&["serie", "numero", "valor"]);
        let map = resolve_columns(&h, &ColumnOverrides::default(), "t.csv").unwrap();
        assert_eq!(map.value, Some(2));
        assert!(map.date.is_none());
        assert!(map.tax_base.is_none());
    }

    #[test]
    fn missing_number_is_error() {
        let h = headers(&["serie", "valor"]);
        let err = resolve_columns(&h, &ColumnOverrides::default(), "t.csv").unwrap_err();
        assert!(err.to_string().contains("'number'"));
    }

    #[test]
    fn override_wins() {
        let h = headers(&["Série", "Numero", "Num. Doc", "Valor"]);
        let overrides = ColumnOverrides {
            number: Some("num doc".into()),
            ..ColumnOverrides::default()
        };
        let map = resolve_columns(&h, &overrides, "t.csv").unwrap();
        assert_eq!(map.number, Some(2));
    }

    #[test]
    fn unknown_override_is_error() {
        let h = headers(&["serie", "numero"]);
        let overrides = ColumnOverrides {
            value: Some("Total Geral".into()),
            ..ColumnOverrides::default()
        };
        let err = resolve_columns(&h, &overrides, "t.csv").unwrap_err();
        assert!(matches!(err, IoError::MissingColumn { ref column, .. } if column == "Total Geral"));
    }

    #[test]
    fn assemble_skips_blank_rows() {
        let map = ColumnMap {
            series: Some(0),
            number: Some(1),
            value: Some(2),
            ..ColumnMap::default()
        };
        let body = vec![
            vec![text_cell("1"), text_cell("10"), text_cell("5,00")],
            vec![None, None, None],
            vec![text_cell("1"), text_cell("11")],
        ];
        let rows = assemble_rows(&map, body, "t.csv", 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, Some(RawValue::Text("5,00".into())));
        assert_eq!(rows[0].origin.as_deref(), Some("t.csv:2"));
        assert!(rows[1].value.is_none());
        assert_eq!(rows[1].origin.as_deref(), Some("t.csv:4"));
    }
}
