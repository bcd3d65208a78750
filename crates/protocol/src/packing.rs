//! Schema-driven packing of component I/O objects.
//!
//! Component inputs and outputs are mappings whose fields are declared in the
//! descriptor with a type tag. On the wire:
//! - `csv` fields travel as delimited text and are tables (rows of strings)
//!   in memory
//! - `binary` fields travel as hex strings and are byte strings in memory
//! - `text` and `json` fields pass through unchanged

use crate::descriptor_models::{FieldType, Schema};
use crate::error::{ProtocolError, ProtocolResult};
use crate::payload::{Payload, PayloadMap};

/// Encode an in-memory I/O object into its wire representation.
///
/// # Errors
///
/// Returns `UnknownField` if a key has no schema entry, or `InvalidField`
/// if a value cannot be encoded as its declared type.
pub fn pack_io(object: &PayloadMap, schema: &Schema) -> ProtocolResult<PayloadMap> {
    let mut packed = PayloadMap::new();

    for (key, value) in object {
        let spec = schema
            .get(key)
            .ok_or_else(|| ProtocolError::UnknownField(key.clone()))?;

        let encoded = match spec.kind {
            FieldType::Csv => Payload::String(write_table(key, value)?),
            FieldType::Binary => match value {
                Payload::Bytes(bytes) => Payload::String(hex::encode(bytes)),
                Payload::String(s) => Payload::String(hex::encode(s.as_bytes())),
                other => return Err(invalid(key, format!("expected bytes, got {:?}", other))),
            },
            FieldType::Text | FieldType::Json => value.clone(),
        };

        packed.insert(key.clone(), encoded);
    }

    Ok(packed)
}

/// Decode a wire I/O object into its in-memory representation.
///
/// # Errors
///
/// Returns `UnknownField` if a key has no schema entry, or `InvalidField`
/// if a value does not decode as its declared type.
pub fn unpack_io(object: &PayloadMap, schema: &Schema) -> ProtocolResult<PayloadMap> {
    let mut unpacked = PayloadMap::new();

    for (key, value) in object {
        let spec = schema
            .get(key)
            .ok_or_else(|| ProtocolError::UnknownField(key.clone()))?;

        let decoded = match spec.kind {
            FieldType::Csv => match value {
                Payload::String(text) => read_table(key, text)?,
                // already a table
                Payload::Sequence(_) => value.clone(),
                other => return Err(invalid(key, format!("expected csv text, got {:?}", other))),
            },
            FieldType::Binary => match value {
                Payload::String(text) => Payload::Bytes(
                    hex::decode(text).map_err(|e| invalid(key, format!("bad hex: {}", e)))?,
                ),
                Payload::Bytes(_) => value.clone(),
                other => return Err(invalid(key, format!("expected hex text, got {:?}", other))),
            },
            FieldType::Text | FieldType::Json => value.clone(),
        };

        unpacked.insert(key.clone(), decoded);
    }

    Ok(unpacked)
}

fn invalid(field: &str, reason: String) -> ProtocolError {
    ProtocolError::InvalidField {
        field: field.to_string(),
        reason,
    }
}

/// Render a table (sequence of rows of scalars) as delimited text.
///
/// An empty row is written as a blank line.
fn write_table(key: &str, value: &Payload) -> ProtocolResult<String> {
    let rows = match value {
        // already delimited text
        Payload::String(text) => return Ok(text.clone()),
        Payload::Sequence(rows) => rows,
        other => return Err(invalid(key, format!("expected a table, got {:?}", other))),
    };

    let mut out = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let cells = row
            .as_sequence()
            .ok_or_else(|| invalid(key, format!("row {} is not a sequence", index)))?;

        let record = cells
            .iter()
            .map(|cell| cell_to_string(cell).ok_or_else(|| invalid(key, format!("row {} has a non-scalar cell", index))))
            .collect::<ProtocolResult<Vec<String>>>()?;

        if record.is_empty() {
            out.push(b'\n');
            continue;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer
            .write_record(&record)
            .map_err(|e| invalid(key, e.to_string()))?;
        let bytes = writer
            .into_inner()
            .map_err(|e| invalid(key, e.to_string()))?;
        out.extend_from_slice(&bytes);
    }

    String::from_utf8(out).map_err(|e| invalid(key, e.to_string()))
}

/// Parse delimited text into a table of string cells.
///
/// A blank line is an empty row.
fn read_table(key: &str, text: &str) -> ProtocolResult<Payload> {
    let mut rows = Vec::new();

    for line in split_records(text) {
        let mut cells = Vec::new();
        if !line.is_empty() {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .from_reader(line.as_bytes());
            if let Some(record) = reader.records().next() {
                let record = record.map_err(|e| invalid(key, e.to_string()))?;
                cells = record.iter().map(|cell| Payload::String(cell.to_string())).collect();
            }
        }
        rows.push(Payload::Sequence(cells));
    }

    Ok(Payload::Sequence(rows))
}

/// Split delimited text into one slice per record, without terminators.
///
/// Line breaks inside quoted cells do not end a record.
fn split_records(text: &str) -> Vec<&str> {
    let mut records = Vec::new();
    let mut start = 0;
    let mut quoted = false;

    for (i, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '\n' if !quoted => {
                records.push(trim_cr(&text[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < text.len() {
        records.push(trim_cr(&text[start..]));
    }

    records
}

fn trim_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn cell_to_string(cell: &Payload) -> Option<String> {
    match cell {
        Payload::String(s) => Some(s.clone()),
        Payload::Int(i) => Some(i.to_string()),
        Payload::Float(f) => Some(f.to_string()),
        Payload::Bool(b) => Some(b.to_string()),
        Payload::Null => Some(String::new()),
        _ => None,
    }
}
