//! Result entries and their rendering for Alfred script filters and the
//! terminal

use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Whether the launcher should verify the entry's file exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "file:skipcheck")]
    FileNoCheck,
}

/// One result row. Order within a result list is significant: best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub uid: String,
    /// Action payload; content matches embed the line number in an encoded path
    pub arg: String,
    pub title: String,
    pub subtitle: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Icon file name or absolute path, empty when unknown
    pub icon: String,
}

/// A single line matched inside a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMatch {
    pub path: PathBuf,
    /// 1-based
    pub line_number: usize,
    /// The matched line including its trailing newline, if it had one
    pub line: String,
}

/// Icon for a file, chosen by extension
pub fn determine_icon(name: &str) -> &'static str {
    let ext = Path::new(name).extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext {
        "cpp" | "cc" => "cpp_logo.png",
        "h" | "hpp" => "h_logo.png",
        "css" => "/Applications/Safari.app/Contents/Resources/css.icns",
        "js" => "js.png",
        "java" => "java.png",
        "html" | "htm" => "/Applications/Safari.app/Contents/Resources/html.icns",
        "md" | "markdown" => "/Applications/Marked 2.app/Contents/Resources/DocumentIcon.icns",
        "go" => "golang.icns",
        "py" => "python-logo-generic.png",
        "rs" | "rust" => "rust.png",
        "swift" => "swift.png",
        "txt" | "text" => "/Applications/TextEdit.app/Contents/Resources/txt.icns",
        _ => "",
    }
}

#[derive(Serialize)]
struct AlfredIcon<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct AlfredItem<'a> {
    uid: &'a str,
    arg: &'a str,
    #[serde(rename = "type")]
    entry_type: EntryType,
    title: &'a str,
    subtitle: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<AlfredIcon<'a>>,
}

#[derive(Serialize)]
struct AlfredItems<'a> {
    items: Vec<AlfredItem<'a>>,
}

/// Write entries as an Alfred script filter document
pub fn write_alfred<W: Write>(out: &mut W, entries: &[ResultEntry]) -> io::Result<()> {
    let doc = AlfredItems {
        items: entries
            .iter()
            .map(|e| AlfredItem {
                uid: &e.uid,
                arg: &e.arg,
                entry_type: e.entry_type,
                title: &e.title,
                subtitle: &e.subtitle,
                icon: (!e.icon.is_empty()).then_some(AlfredIcon { path: &e.icon }),
            })
            .collect(),
    };
    serde_json::to_writer_pretty(&mut *out, &doc)?;
    writeln!(out)
}

/// Terminal listing: title highlighted, subtitle dimmed underneath
pub fn write_plain<W: WriteColor>(out: &mut W, entries: &[ResultEntry]) -> io::Result<()> {
    for e in entries {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
        write!(out, "{}", e.title.trim_end_matches('\n'))?;
        out.reset()?;
        writeln!(out)?;

        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_dimmed(true))?;
        write!(out, "  {}", e.subtitle.trim_end_matches('\n'))?;
        out.reset()?;
        writeln!(out)?;
    }
    Ok(())
}

/// Print entries to stdout, either as Alfred JSON or as a colored listing
pub fn print_entries(entries: &[ResultEntry], plain: bool, color: bool) -> io::Result<()> {
    if plain {
        let choice = if color { ColorChoice::Auto } else { ColorChoice::Never };
        let mut stdout = StandardStream::stdout(choice);
        write_plain(&mut stdout, entries)
    } else {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        write_alfred(&mut lock, entries)
    }
}
