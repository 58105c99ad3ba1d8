//! Formatting utilities for C emission.

/// Apply `indent` spaces to the beginning of every line of a multi-line
/// string.
pub fn indent_multi_line(text: &str, indent: usize) -> String {
    let pad = " ".repeat(indent);
    text.split('\n').map(|line| format!("{pad}{line}")).collect::<Vec<_>>().join("\n")
}

/// Render a floating-point value as a C literal that parses back to the
/// identical bit pattern.
///
/// Rust's shortest round-trip rendering guarantees exactness; extreme
/// magnitudes switch to exponent notation so literals stay compact.
pub trait CLiteral {
    fn c_literal(&self) -> String;
}

macro_rules! impl_float_literal {
    ($t:ty) => {
        impl CLiteral for $t {
            fn c_literal(&self) -> String {
                let v = *self;
                if v == 0.0 {
                    return "0".to_string();
                }
                let magnitude = v.abs();
                if magnitude < 1e-5 || magnitude >= 1e16 {
                    format!("{v:e}")
                } else {
                    format!("{v}")
                }
            }
        }
    };
}

impl_float_literal!(f32);
impl_float_literal!(f64);

macro_rules! impl_int_literal {
    ($($t:ty),*) => {
        $(impl CLiteral for $t {
            fn c_literal(&self) -> String {
                format!("{self}")
            }
        })*
    };
}

impl_int_literal!(i32, u32, u64, usize);

// =============================================================================
// ArrayFormatter
// =============================================================================

/// Format array entries as comma-separated text wrapped to a maximum width,
/// rendering floating-point entries at full round-trip precision.
pub struct ArrayFormatter {
    out: String,
    text_width: usize,
    indent: usize,
    line_length: usize,
    is_empty: bool,
}

impl ArrayFormatter {
    pub fn new(text_width: usize, indent: usize) -> Self {
        Self {
            out: String::new(),
            text_width,
            indent,
            line_length: indent,
            is_empty: true,
        }
    }

    /// Append one entry, wrapping onto a new line when the current line
    /// would exceed the text width.
    pub fn push<T: CLiteral>(&mut self, entry: T) {
        if self.is_empty {
            self.is_empty = false;
            self.out.push_str(&" ".repeat(self.indent));
        }
        let token = format!("{}, ", entry.c_literal());
        if self.line_length + token.len() <= self.text_width {
            self.out.push_str(&token);
            self.line_length += token.len();
        } else {
            self.out.push('\n');
            self.out.push_str(&" ".repeat(self.indent));
            self.line_length = token.len() + self.indent;
            self.out.push_str(&token);
        }
    }

    /// The rendered array body.
    pub fn into_string(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indentation_applies_to_every_line() {
        assert_eq!(indent_multi_line("a\nb", 2), "  a\n  b");
        assert_eq!(indent_multi_line("a", 0), "a");
    }

    #[test]
    fn float_literals_round_trip() {
        for v in [0.5f32, 1.0 / 3.0, f32::MIN_POSITIVE, 1.23456789e30, -16777216.0] {
            let rendered = v.c_literal();
            assert_eq!(rendered.parse::<f32>().unwrap(), v, "literal {rendered}");
        }
        for v in [0.1f64, 2.0_f64.powi(-40), 9.87654321e200] {
            let rendered = v.c_literal();
            assert_eq!(rendered.parse::<f64>().unwrap(), v, "literal {rendered}");
        }
    }

    #[test]
    fn small_magnitudes_use_exponent_notation() {
        assert!(1e-30f32.c_literal().contains('e'));
        assert_eq!(0.0f64.c_literal(), "0");
        assert_eq!(0.5f32.c_literal(), "0.5");
    }

    #[test]
    fn array_formatter_wraps_lines() {
        let mut formatter = ArrayFormatter::new(20, 2);
        for i in 0..8 {
            formatter.push(i * 1000);
        }
        let text = formatter.into_string();
        for line in text.lines() {
            assert!(line.len() <= 20, "line too long: {line:?}");
            assert!(line.starts_with("  "));
        }
        let flat: String = text.replace(['\n', ' '], "");
        assert_eq!(flat, "0,1000,2000,3000,4000,5000,6000,7000,");
    }

    #[test]
    fn array_formatter_empty() {
        let formatter = ArrayFormatter::new(80, 2);
        assert_eq!(formatter.into_string(), "");
    }
}
