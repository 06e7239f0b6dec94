//! Text measurement and soft wrapping for the title overlay.
//!
//! Line breaks are decided from glyph advances. With a font file the
//! advances come from the font itself (`fontdue`); without one they are
//! estimated from a per-glyph ratio table, so line counts can differ by a
//! line from what the rendered font would need. ffmpeg does the actual
//! drawing either way.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use fontdue::{Font, FontSettings};

/// Result of [`GlyphWidths::soft_wrap`]: the text with `\n` inserted and its
/// line count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftWrap {
    pub text: String,
    pub lines: usize,
}

/// Advance of a glyph as a fraction of the font size.
fn advance_ratio(c: char) -> f32 {
    match c {
        'i' | 'j' | 'l' | 'I' | '!' | '|' | '.' | ',' | ':' | ';' | '\'' => 0.28,
        ' ' | 'f' | 't' | 'r' | '(' | ')' | '[' | ']' | '-' => 0.35,
        'm' | 'w' | 'M' | 'W' | '@' => 0.85,
        c if c.is_ascii_uppercase() => 0.65,
        c if c.is_ascii_digit() => 0.55,
        c if c.is_ascii() => 0.5,
        // CJK and emoji are roughly square.
        _ => 1.0,
    }
}

/// Source of glyph advances.
#[derive(Clone, Default)]
pub enum GlyphWidths {
    /// Ratio table, no font needed.
    #[default]
    Estimated,
    /// Advances measured from a TrueType/OpenType file.
    Font { font: Font, path: PathBuf },
}

impl fmt::Debug for GlyphWidths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Estimated => f.write_str("Estimated"),
            Self::Font { path, .. } => f.debug_struct("Font").field("path", path).finish(),
        }
    }
}

impl GlyphWidths {
    pub fn from_font_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font {}: {error}", path.display()))?;
        Ok(Self::Font {
            font,
            path: path.to_path_buf(),
        })
    }

    /// Font file backing the measurements, if any.
    pub fn font_file(&self) -> Option<&Path> {
        match self {
            Self::Estimated => None,
            Self::Font { path, .. } => Some(path),
        }
    }

    fn advance(&self, c: char, font_size: f32) -> f32 {
        match self {
            Self::Estimated => advance_ratio(c) * font_size,
            Self::Font { font, .. } => font.metrics(c, font_size).advance_width,
        }
    }

    /// Rendered width of `text` in pixels, including `letter_spacing`
    /// between consecutive glyphs.
    pub fn text_width(&self, text: &str, font_size: f32, letter_spacing: f32) -> f32 {
        let glyphs = text.chars().count();
        if glyphs == 0 {
            return 0.0;
        }
        let advances: f32 = text.chars().map(|c| self.advance(c, font_size)).sum();
        advances + (glyphs - 1) as f32 * letter_spacing
    }

    /// Wraps `text` so each line fits in `max_width` pixels.
    ///
    /// Text that already fits is returned untouched with a line count of 1.
    /// Otherwise the average glyph width decides how many characters fit on
    /// a line and the text is greedily wrapped on whitespace, splitting words
    /// that are longer than a whole line.
    pub fn soft_wrap(
        &self,
        text: &str,
        font_size: f32,
        letter_spacing: f32,
        max_width: f32,
    ) -> SoftWrap {
        let width = self.text_width(text, font_size, letter_spacing);
        if width < max_width {
            return SoftWrap {
                text: text.to_owned(),
                lines: 1,
            };
        }

        let letter_width = width / text.chars().count() as f32;
        let max_chars = ((max_width / letter_width).floor() as usize).max(1);
        let lines = wrap_words(text, max_chars);
        let wrapped = lines.join("\n");
        let count = wrapped.matches('\n').count() + 1;
        SoftWrap {
            text: wrapped,
            lines: count,
        }
    }
}

fn wrap_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        if current_len > 0 && current_len + 1 + word.len() <= max_chars {
            current.push(' ');
            current.extend(word.iter());
            current_len += 1 + word.len();
            continue;
        }

        if current_len > 0 {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }

        while word.len() > max_chars {
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        current.extend(word.iter());
        current_len = word.len();
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FONT_CANDIDATES: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
        "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
        "/Library/Fonts/Arial Bold.ttf",
    ];

    fn text_width(text: &str, font_size: f32, letter_spacing: f32) -> f32 {
        GlyphWidths::Estimated.text_width(text, font_size, letter_spacing)
    }

    fn soft_wrap(text: &str, font_size: f32, letter_spacing: f32, max_width: f32) -> SoftWrap {
        GlyphWidths::Estimated.soft_wrap(text, font_size, letter_spacing, max_width)
    }

    #[test]
    fn short_text_is_returned_unchanged() {
        let wrapped = soft_wrap("Short title", 40.0, 1.0, 576.0);
        assert_eq!(wrapped.text, "Short title");
        assert_eq!(wrapped.lines, 1);
    }

    #[test]
    fn empty_text_is_a_single_line() {
        let wrapped = soft_wrap("", 40.0, 1.0, 576.0);
        assert_eq!(wrapped, SoftWrap { text: String::new(), lines: 1 });
    }

    #[test]
    fn uniform_glyphs_wrap_at_expected_column() {
        // 'a' advances 20px at size 40, plus 1px spacing: 21px per glyph on
        // average once spacing is amortized, so 100px fits 4 glyphs.
        let text = "aaaa aaaa aaaa";
        let width = text_width(text, 40.0, 1.0);
        let per_char = width / text.chars().count() as f32;
        let max_chars = (100.0 / per_char).floor() as usize;
        assert_eq!(max_chars, 4);

        let wrapped = soft_wrap(text, 40.0, 1.0, 100.0);
        assert_eq!(wrapped.text, "aaaa\naaaa\naaaa");
        assert_eq!(wrapped.lines, 3);
        assert_eq!(wrapped.lines, wrapped.text.matches('\n').count() + 1);
    }

    #[test]
    fn long_words_are_split() {
        let wrapped = soft_wrap("aaaaaaaaaa", 40.0, 0.0, 80.0);
        assert_eq!(wrapped.text, "aaaa\naaaa\naa");
        assert_eq!(wrapped.lines, 3);
    }

    #[test]
    fn long_title_fits_canvas_width() {
        let title = "The Most Incredible Story About A Cat Who Learned To Fly Over The Ocean";
        let wrapped = soft_wrap(title, 40.0, 1.0, 576.0);
        assert!(wrapped.lines > 1);
        for line in wrapped.text.lines() {
            assert!(line.chars().count() <= 30, "line too long: {line}");
        }
        assert_eq!(wrapped.text.replace('\n', " "), title);
    }

    #[test]
    fn invalid_font_file_is_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, "not a font")?;
        let err = GlyphWidths::from_font_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse font"));
        assert!(GlyphWidths::from_font_file("/nonexistent/font.ttf").is_err());
        Ok(())
    }

    #[test]
    fn font_measurements_drive_wrapping() -> Result<()> {
        let Some(path) = FONT_CANDIDATES.iter().map(Path::new).find(|p| p.is_file()) else {
            return Ok(());
        };
        let glyphs = GlyphWidths::from_font_file(path)?;
        assert_eq!(glyphs.font_file(), Some(path));
        assert!(glyphs.text_width("WWWW", 40.0, 1.0) > glyphs.text_width("iiii", 40.0, 1.0));
        assert_eq!(glyphs.text_width("", 40.0, 1.0), 0.0);

        let title = "The Most Incredible Story About A Cat Who Learned To Fly Over The Ocean";
        let wrapped = glyphs.soft_wrap(title, 40.0, 1.0, 576.0);
        assert!(wrapped.lines > 1);
        assert_eq!(wrapped.lines, wrapped.text.lines().count());
        assert_eq!(wrapped.text.replace('\n', " "), title);

        let short = glyphs.soft_wrap("Cats", 40.0, 1.0, 576.0);
        assert_eq!(short, SoftWrap { text: "Cats".into(), lines: 1 });
        Ok(())
    }
}
