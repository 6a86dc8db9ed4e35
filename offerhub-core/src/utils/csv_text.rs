//! Delimited-text rendering shared by the exporter and the ingestion
//! diagnostics.
//!
//! Rows are comma separated and `\n` terminated, header first. Fields are
//! quoted only when they contain a structural character, unless a column
//! asks for quoting.

/// Render a header row followed by `rows` with a fixed column count.
pub fn render_table<const N: usize>(
    headers: &[&str; N],
    rows: &[[String; N]],
) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Encode a single field with the given quoting, without a terminator.
pub fn encode_field(field: &str, style: csv::QuoteStyle) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(style)
        .from_writer(Vec::new());
    writer.write_record([field])?;

    let mut bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Textual form of an optional value; absent renders as an empty string.
pub fn opt_text<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_headers_and_rows_in_order() {
        let rows = [
            ["ABC-1".to_string(), "10".to_string(), "CHF".to_string()],
            ["ABC-2".to_string(), "12".to_string(), "EUR".to_string()],
        ];
        let out = render_table(&["providerKey", "price", "currency"], &rows).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "providerKey,price,currency\nABC-1,10,CHF\nABC-2,12,EUR\n"
        );
    }

    #[test]
    fn absent_values_render_empty() {
        let rows = [["ABC-3".to_string(), opt_text::<u32>(None), String::new()]];
        let out = render_table(&["providerKey", "price", "currency"], &rows).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "providerKey,price,currency\nABC-3,,\n"
        );
    }

    #[test]
    fn structural_characters_are_quoted() {
        let necessary = |field| encode_field(field, csv::QuoteStyle::Necessary).unwrap();
        assert_eq!(necessary("plain"), "plain");
        assert_eq!(necessary("a,b"), "\"a,b\"");
        assert_eq!(
            encode_field("say \"hi\"", csv::QuoteStyle::Always).unwrap(),
            "\"say \"\"hi\"\"\""
        );
    }
}
