//! HDL identifier handling for component and instance labels.

use std::collections::HashSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdlDialect {
    Vhdl,
    Verilog,
}

const VHDL_KEYWORDS: &[&str] = &[
    "abs", "access", "after", "alias", "all", "and", "architecture", "array", "assert",
    "attribute", "begin", "block", "body", "buffer", "bus", "case", "component",
    "configuration", "constant", "disconnect", "downto", "else", "elsif", "end", "entity",
    "exit", "file", "for", "function", "generate", "generic", "group", "guarded", "if",
    "impure", "in", "inertial", "inout", "is", "label", "library", "linkage", "literal",
    "loop", "map", "mod", "nand", "new", "next", "nor", "not", "null", "of", "on", "open",
    "or", "others", "out", "package", "port", "postponed", "procedure", "process", "pure",
    "range", "record", "register", "reject", "rem", "report", "return", "rol", "ror",
    "select", "severity", "signal", "shared", "sla", "sll", "sra", "srl", "subtype", "then",
    "to", "transport", "type", "unaffected", "units", "until", "use", "variable", "wait",
    "when", "while", "with", "xnor", "xor",
];

const VERILOG_KEYWORDS: &[&str] = &[
    "always", "and", "assign", "automatic", "begin", "buf", "bufif0", "bufif1", "case",
    "casex", "casez", "cell", "cmos", "config", "deassign", "default", "defparam", "design",
    "disable", "edge", "else", "end", "endcase", "endconfig", "endfunction", "endgenerate",
    "endmodule", "endprimitive", "endspecify", "endtable", "endtask", "event", "for",
    "force", "forever", "fork", "function", "generate", "genvar", "highz0", "highz1", "if",
    "ifnone", "incdir", "include", "initial", "inout", "input", "instance", "integer",
    "join", "large", "liblist", "library", "localparam", "macromodule", "medium", "module",
    "nand", "negedge", "nmos", "nor", "noshowcancelled", "not", "notif0", "notif1", "or",
    "output", "parameter", "pmos", "posedge", "primitive", "pull0", "pull1", "pulldown",
    "pullup", "pulsestyle_onevent", "pulsestyle_ondetect", "rcmos", "real", "realtime",
    "reg", "release", "repeat", "rnmos", "rpmos", "rtran", "rtranif0", "rtranif1",
    "scalared", "showcancelled", "signed", "small", "specify", "specparam", "strong0",
    "strong1", "supply0", "supply1", "table", "task", "time", "tran", "tranif0", "tranif1",
    "tri", "tri0", "tri1", "triand", "trior", "trireg", "unsigned", "use", "uwire",
    "vectored", "wait", "wand", "weak0", "weak1", "while", "wire", "wor", "xnor", "xor",
];

fn keyword_set(dialect: HdlDialect) -> &'static HashSet<&'static str> {
    static VHDL: OnceLock<HashSet<&'static str>> = OnceLock::new();
    static VERILOG: OnceLock<HashSet<&'static str>> = OnceLock::new();
    match dialect {
        HdlDialect::Vhdl => VHDL.get_or_init(|| VHDL_KEYWORDS.iter().copied().collect()),
        HdlDialect::Verilog => VERILOG.get_or_init(|| VERILOG_KEYWORDS.iter().copied().collect()),
    }
}

/// Turns free text into an identifier candidate.
///
/// Digit-leading text gets an `L_` prefix; spaces and dashes become
/// underscores. Empty text stays empty.
pub fn canonical_label(label: &str) -> String {
    if label.is_empty() {
        return String::new();
    }
    let mut result = String::with_capacity(label.len() + 2);
    if label.starts_with(|c: char| c.is_ascii_digit()) {
        result.push_str("L_");
    }
    result.extend(label.chars().map(|c| if c == ' ' || c == '-' { '_' } else { c }));
    result
}

/// First dialect in which `label` is a keyword, compared case-insensitively.
pub fn reserved_in(label: &str) -> Option<HdlDialect> {
    let lower = label.to_ascii_lowercase();
    [HdlDialect::Vhdl, HdlDialect::Verilog]
        .into_iter()
        .find(|&dialect| keyword_set(dialect).contains(lower.as_str()))
}

/// Checks the canonical form of `label` for use as an HDL identifier.
pub fn is_correct_label(label: &str) -> bool {
    let canonical = canonical_label(label);
    if canonical.is_empty() {
        return false;
    }
    let chars_ok = canonical
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    chars_ok && reserved_in(&canonical).is_none()
}

/// Label protocol consumed by the netlist builder and hierarchy walks.
pub trait LabelPolicy: Send + Sync {
    fn canonical(&self, label: &str) -> String;

    fn is_valid(&self, label: &str) -> bool;

    /// Uppercased canonical form, used for uniqueness comparisons.
    fn comparison_key(&self, label: &str) -> String {
        self.canonical(label).to_uppercase()
    }
}

/// Default policy covering VHDL and Verilog.
#[derive(Debug, Clone, Copy, Default)]
pub struct HdlLabels;

impl LabelPolicy for HdlLabels {
    fn canonical(&self, label: &str) -> String {
        canonical_label(label)
    }

    fn is_valid(&self, label: &str) -> bool {
        is_correct_label(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_label() {
        assert_eq!(canonical_label(""), "");
        assert_eq!(canonical_label("4bit adder"), "L_4bit_adder");
        assert_eq!(canonical_label("data-in"), "data_in");
        assert_eq!(canonical_label("clk"), "clk");
    }

    #[test]
    fn test_reserved_words() {
        assert_eq!(reserved_in("Signal"), Some(HdlDialect::Vhdl));
        assert_eq!(reserved_in("posedge"), Some(HdlDialect::Verilog));
        assert_eq!(reserved_in("counter"), None);
        assert!(!is_correct_label("entity"));
        assert!(!is_correct_label("WIRE"));
    }

    #[test]
    fn test_is_correct_label() {
        assert!(is_correct_label("counter_1"));
        assert!(is_correct_label("3 state"));
        assert!(!is_correct_label("a&b"));
        assert!(!is_correct_label(""));
    }

    #[test]
    fn test_comparison_key() {
        let policy = HdlLabels;
        assert_eq!(policy.comparison_key("my-reg"), "MY_REG");
        assert_eq!(policy.comparison_key("1x"), "L_1X");
    }
}
