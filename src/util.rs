use std::path::Path;

use directories::BaseDirs;
use ratatui::{buffer::Buffer, layout::Rect, style::Color};
use unicode_width::UnicodeWidthStr;

pub fn fill_bg(buf: &mut Buffer, area: Rect, color: Color) {
    for x in area.left()..area.right() {
        for y in area.top()..area.bottom() {
            buf[(x, y)].set_bg(color);
        }
    }
}

pub fn pad<S: AsRef<str>>(s: S, pad: usize) -> String {
    let spaces = " ".repeat(pad);
    format!("{spaces}{}{spaces}", s.as_ref())
}

/// Cuts `s` to at most `width` terminal columns, marking the cut with `…`.
pub fn truncate(s: &str, width: usize) -> String {
    if s.width() <= width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

pub fn abbreviate_home(path: &Path) -> String {
    let Some(base_dirs) = BaseDirs::new() else {
        return path.display().to_string();
    };
    match path.strip_prefix(base_dirs.home_dir()) {
        Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => path.display().to_string(),
    }
}
