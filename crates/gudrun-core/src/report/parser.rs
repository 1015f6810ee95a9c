use super::{GudFile, ReportValue, TWEAK_FACTOR_MARKER, WARNING_MARKER, percentage_from_block};
use crate::domain::TokenError;
use crate::parser::{LineCursor, TokenLine, parse_f64};
use std::path::Path;

type TokenResult<T> = Result<T, TokenError>;

fn value_at(line: &TokenLine<'_>, from_end: usize) -> TokenResult<ReportValue> {
    let token = line.token_from_end(from_end)?;
    let literal = token.trim_end_matches('%');
    Ok(ReportValue {
        value: parse_f64(line.number, literal)?,
        literal: literal.to_string(),
    })
}

fn header_line(cursor: &mut LineCursor<'_>) -> TokenResult<String> {
    cursor.skip_blank_lines();
    let (_, raw) = cursor.next_raw()?;
    Ok(raw.trim().to_string())
}

pub(super) fn parse_gud_file(path: &Path, source: &str) -> TokenResult<GudFile> {
    let mut cursor = LineCursor::new(source);

    let (_, name) = cursor.next_raw()?;
    let name = name.trim().to_string();
    let title = header_line(&mut cursor)?;
    let author = header_line(&mut cursor)?;
    let stamp = header_line(&mut cursor)?;

    let density = value_at(&cursor.next_data()?, 0)?;
    let average_scattering_length = value_at(&cursor.next_data()?, 0)?;
    let average_scattering_length_squared = value_at(&cursor.next_data()?, 0)?;
    let average_square_of_scattering_length = value_at(&cursor.next_data()?, 0)?;
    let coherent_ratio = value_at(&cursor.next_data()?, 0)?;
    let expected_dcs = value_at(&cursor.next_data()?, 0)?;

    for _ in 0..3 {
        cursor.next_raw()?;
    }

    let mut groups_table = Vec::new();
    while let Some(row) = cursor.peek().filter(|line| !line.trim().is_empty()) {
        groups_table.push(row.to_string());
        cursor.next_raw()?;
    }

    let count_line = cursor.next_data()?;
    let count_token = count_line.token_from_end(0)?;
    let group_count = count_token.parse::<u32>().map_err(|_| {
        TokenError::new(
            count_line.number,
            format!("expected a group count, found '{count_token}'"),
        )
    })?;

    let merged_line = cursor.next_data()?;
    let average_level_merged_dcs = value_at(&merged_line, 1)?;
    let gradient = value_at(&merged_line, 3)?;

    let mut error_lines = Vec::new();
    let mut result = String::new();
    let (_, first) = cursor
        .peek_data()
        .ok_or_else(|| TokenError::new(cursor.line_number(), "missing result block"))?;
    if first.contains(WARNING_MARKER) {
        cursor.skip_blank_lines();
        while let Some(line) = cursor.peek() {
            if line.contains(TWEAK_FACTOR_MARKER) {
                break;
            }
            error_lines.push(line.to_string());
            cursor.next_raw()?;
        }
    } else {
        result = cursor.next_data()?.raw.to_string();
        cursor.next_raw()?;
    }

    let block = if error_lines.is_empty() {
        result.clone()
    } else {
        error_lines.join("\n")
    };
    let percentage = percentage_from_block(&block);

    let tweak_line = cursor.next_data()?;
    let suggested_tweak_factor = value_at(&tweak_line, 0)?;

    Ok(GudFile {
        path: path.to_path_buf(),
        name,
        title,
        author,
        stamp,
        density,
        average_scattering_length,
        average_scattering_length_squared,
        average_square_of_scattering_length,
        coherent_ratio,
        expected_dcs,
        groups_table,
        group_count,
        average_level_merged_dcs,
        gradient,
        error_lines,
        result,
        percentage,
        suggested_tweak_factor,
    })
}
