//! Line-respecting fixed-size text slicer.
//!
//! Accumulates whole lines (newlines preserved) until adding the next line
//! would exceed the character budget. Concatenating every slice's content
//! reproduces the input text exactly. A single line longer than the budget
//! is split at character boundaries — the size bound dominates.

pub(crate) struct Slice {
    /// Zero-indexed line the slice starts on.
    pub start_line: usize,
    /// Zero-indexed line the slice ends on (inclusive).
    pub end_line: usize,
    pub content: String,
}

pub(crate) fn slice_lines(text: &str, max_chars: usize) -> Vec<Slice> {
    let max_chars = max_chars.max(1);
    let mut slices: Vec<Slice> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;
    let mut current_start = 0usize;
    let mut prev_line = 0usize;

    for (line_index, segment) in text.split_inclusive('\n').enumerate() {
        let segment_chars = segment.chars().count();

        if segment_chars > max_chars {
            if !current.is_empty() {
                slices.push(Slice {
                    start_line: current_start,
                    end_line: prev_line,
                    content: std::mem::take(&mut current),
                });
                current_chars = 0;
            }
            let chars: Vec<char> = segment.chars().collect();
            for piece in chars.chunks(max_chars) {
                slices.push(Slice {
                    start_line: line_index,
                    end_line: line_index,
                    content: piece.iter().collect(),
                });
            }
            current_start = line_index + 1;
            continue;
        }

        if !current.is_empty() && current_chars + segment_chars > max_chars {
            slices.push(Slice {
                start_line: current_start,
                end_line: prev_line,
                content: std::mem::take(&mut current),
            });
            current_chars = 0;
        }
        if current.is_empty() {
            current_start = line_index;
        }
        current.push_str(segment);
        current_chars += segment_chars;
        prev_line = line_index;
    }

    if !current.is_empty() {
        slices.push(Slice {
            start_line: current_start,
            end_line: prev_line,
            content: current,
        });
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat(slices: &[Slice]) -> String {
        slices.iter().map(|s| s.content.as_str()).collect()
    }

    #[test]
    fn empty_text_yields_no_slices() {
        assert!(slice_lines("", 100).is_empty());
    }

    #[test]
    fn short_text_is_one_slice() {
        let slices = slice_lines("one\ntwo\nthree", 100);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].start_line, 0);
        assert_eq!(slices[0].end_line, 2);
        assert_eq!(slices[0].content, "one\ntwo\nthree");
    }

    #[test]
    fn never_splits_inside_a_normal_line() {
        let text = "aaaa\nbbbb\ncccc\ndddd\n";
        let slices = slice_lines(text, 10);
        for slice in &slices {
            // Every slice boundary falls on a line boundary.
            assert!(slice.content.ends_with('\n'));
        }
        assert_eq!(concat(&slices), text);
    }

    #[test]
    fn concatenation_reconstructs_input_exactly() {
        let text = "fn main() {\n    let x = 1;\n    let y = 2;\n}\nno trailing newline";
        for max in [1, 5, 12, 40, 1000] {
            let slices = slice_lines(text, max);
            assert_eq!(concat(&slices), text, "max {max}");
        }
    }

    #[test]
    fn every_slice_respects_the_bound() {
        let mut text = String::new();
        for i in 0..50 {
            text.push_str(&format!("line number {i} with some padding\n"));
        }
        // Include one pathological 400-char line.
        text.push_str(&"x".repeat(400));
        text.push('\n');

        for max in [7, 33, 100, 256] {
            for slice in slice_lines(&text, max) {
                assert!(
                    slice.content.chars().count() <= max,
                    "slice of {} chars exceeds {max}",
                    slice.content.chars().count()
                );
            }
        }
    }

    #[test]
    fn oversized_line_is_hard_split_on_char_boundaries() {
        let text = format!("short\n{}\nshort again", "é".repeat(20));
        let slices = slice_lines(&text, 8);
        assert_eq!(concat(&slices), text);
        for slice in &slices {
            assert!(slice.content.chars().count() <= 8);
        }
        // The split pieces of the long line all report the same line index.
        let long_pieces: Vec<&Slice> = slices
            .iter()
            .filter(|s| s.content.contains('é'))
            .collect();
        assert!(long_pieces.len() >= 3);
        assert!(long_pieces.iter().all(|s| s.start_line == 1 && s.end_line == 1));
    }

    #[test]
    fn line_indices_track_the_source() {
        let text = "a\nb\nc\nd\ne\n";
        let slices = slice_lines(text, 4); // two 2-char lines per slice
        assert_eq!(slices.len(), 3);
        assert_eq!((slices[0].start_line, slices[0].end_line), (0, 1));
        assert_eq!((slices[1].start_line, slices[1].end_line), (2, 3));
        assert_eq!((slices[2].start_line, slices[2].end_line), (4, 4));
    }
}
