//! Output truncation for tool results fed back to the model.

/// How to truncate output that exceeds the maximum character limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationMode {
    /// Keep first 40% and last 60%, with a marker in the middle.
    HeadTail,
    /// Keep last `max_chars`, with a marker at the start.
    Tail,
}

/// Truncate `output` to at most `max_chars` bytes of content using the given mode.
///
/// If the output is within the limit, it is returned unchanged. Cut points
/// are moved onto UTF-8 character boundaries, so slightly less than
/// `max_chars` may be kept.
pub fn truncate_output(output: &str, max_chars: usize, mode: TruncationMode) -> String {
    if output.len() <= max_chars {
        return output.to_string();
    }

    match mode {
        TruncationMode::HeadTail => {
            let head_end = floor_boundary(output, max_chars * 40 / 100);
            let tail_start = ceil_boundary(output, output.len() - (max_chars - max_chars * 40 / 100));
            let removed = tail_start - head_end;
            format!(
                "{}\n[WARNING: Output truncated. {} characters removed from middle]\n{}",
                &output[..head_end],
                removed,
                &output[tail_start..]
            )
        }
        TruncationMode::Tail => {
            let tail_start = ceil_boundary(output, output.len() - max_chars);
            format!(
                "\n[WARNING: Output truncated. {} characters removed from start]\n{}",
                tail_start,
                &output[tail_start..]
            )
        }
    }
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
