//! XML sidecar listing channel TIFFs for import into the BIAS viewer.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;

use super::flat_tiff::channel_file_name;

const INDENT: &str = "    ";
const NEWLINE: &str = "\r\n";

pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render the sidecar document. Channel ids are 1-based and follow `channels` order.
pub fn render_sidecar(channels: &[String], slide: &str, cropped: bool) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut line = |depth: usize, text: String| lines.push(format!("{}{text}", INDENT.repeat(depth)));

    line(0, r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_string());
    line(0, r#"<BIAS version="1.0">"#.to_string());
    line(1, "<channels>".to_string());
    for (i, channel) in channels.iter().enumerate() {
        line(2, format!(r#"<channel id="{}">"#, i + 1));
        line(3, format!("<name>{}</name>", escape_xml(channel)));
        line(2, "</channel>".to_string());
    }
    line(1, "</channels>".to_string());
    line(1, "<images>".to_string());
    for (i, channel) in channels.iter().enumerate() {
        let url = channel_file_name(slide, channel, cropped);
        line(2, format!(r#"<image url="{}">"#, escape_xml(&url)));
        line(3, format!("<channel>{}</channel>", i + 1));
        line(2, "</image>".to_string());
    }
    line(1, "</images>".to_string());
    line(0, "</BIAS>".to_string());

    lines.join(NEWLINE)
}

/// Write `{slide}.XML` into `outdir`.
pub fn write_sidecar(outdir: &Path, channels: &[String], slide: &str, cropped: bool) -> Result<PathBuf> {
    let path = outdir.join(format!("{slide}.XML"));
    std::fs::write(&path, render_sidecar(channels, slide, cropped))?;
    info!(path = %path.display(), "Wrote XML sidecar");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape_xml(r#"a<b>&"c""#), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
