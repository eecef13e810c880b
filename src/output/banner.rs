//! Startup banner

const ART: [&str; 5] = [
    r" _   _      _   ____        _          ",
    r"| \ | | ___| |_|  _ \ _   _| |___  ___ ",
    r"|  \| |/ _ \ __| |_) | | | | / __|/ _ \",
    r"| |\  |  __/ |_|  __/| |_| | \__ \  __/",
    r"|_| \_|\___|\__|_|    \__,_|_|___/\___|",
];

/// Center `line` within `width` columns; lines wider than `width` are left as is
fn center(line: &str, width: usize) -> String {
    let len = line.chars().count();
    if len >= width {
        return line.trim_end().to_string();
    }
    let pad = (width - len) / 2;
    format!("{}{}", " ".repeat(pad), line).trim_end().to_string()
}

/// Banner text centered for a terminal of `width` columns, with a trailing
/// blank line
pub fn render(width: usize) -> String {
    let mut out = String::new();
    for line in ART {
        out.push_str(&center(line, width));
        out.push('\n');
    }
    out.push_str(&center(&crate::cli::Cli::version_line(), width));
    out.push_str("\n\n");
    out
}
