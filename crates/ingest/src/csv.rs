//! Minimal CSV reader: UTF-8, comma-delimited, optional double-quoting
//! with `""` escapes, CRLF tolerant.

/// Split `text` into records of fields, honoring quoted fields (which may
/// contain commas, quotes and newlines). Blank lines outside quotes are
/// dropped.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // Tracks whether the current record has any content, so a lone trailing
    // newline does not produce an empty record.
    let mut record_dirty = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                record_dirty = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                record_dirty = true;
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                flush_record(&mut records, &mut record, &mut field, &mut record_dirty);
            }
            '\n' => {
                flush_record(&mut records, &mut record, &mut field, &mut record_dirty);
            }
            _ => {
                field.push(c);
                record_dirty = true;
            }
        }
    }
    flush_record(&mut records, &mut record, &mut field, &mut record_dirty);
    records
}

fn flush_record(
    records: &mut Vec<Vec<String>>,
    record: &mut Vec<String>,
    field: &mut String,
    dirty: &mut bool,
) {
    if *dirty || !record.is_empty() {
        record.push(std::mem::take(field));
        records.push(std::mem::take(record));
    }
    field.clear();
    *dirty = false;
}

/// Quote a field for CSV output when it contains a delimiter, quote or
/// newline. Used by tests and export helpers.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
