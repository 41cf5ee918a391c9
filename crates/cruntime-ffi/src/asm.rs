//! Inline-asm helper.
//!
//! Pure tooling: parses extended-asm blocks, validates constraint
//! strings and register names against the detected architecture, and
//! exposes a handful of back-architecture helpers. Does not participate
//! in code generation — nothing here touches the code generator.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmOperand {
    pub constraint: String,
    pub expr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmBlock {
    pub template: String,
    pub outputs: Vec<AsmOperand>,
    pub inputs: Vec<AsmOperand>,
    pub clobbers: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AsmParseError {
    #[error("missing closing quote in asm template")]
    UnterminatedTemplate,

    #[error("extended asm block has too many ':'-separated sections (expected at most 4)")]
    TooManySections,

    #[error("malformed operand: {0}")]
    MalformedOperand(String),
}

/// Parses `"template" : outputs : inputs : clobbers`. Any of the
/// three trailing sections may be omitted, as in real extended asm.
pub fn parse_extended_asm(text: &str) -> Result<AsmBlock, AsmParseError> {
    let text = text.trim();
    if !text.starts_with('"') {
        return Err(AsmParseError::MalformedOperand(text.to_string()));
    }

    let rest = &text[1..];
    let end = rest.find('"').ok_or(AsmParseError::UnterminatedTemplate)?;
    let template = rest[..end].to_string();
    let remainder = rest[end + 1..].trim_start();

    let sections = split_top_level_colons(remainder)?;
    if sections.len() > 3 {
        return Err(AsmParseError::TooManySections);
    }

    let outputs = sections
        .first()
        .map(|s| parse_operand_list(s))
        .transpose()?
        .unwrap_or_default();
    let inputs = sections
        .get(1)
        .map(|s| parse_operand_list(s))
        .transpose()?
        .unwrap_or_default();
    let clobbers = sections
        .get(2)
        .map(|s| parse_clobber_list(s))
        .unwrap_or_default();

    Ok(AsmBlock {
        template,
        outputs,
        inputs,
        clobbers,
    })
}

fn split_top_level_colons(text: &str) -> Result<Vec<String>, AsmParseError> {
    let text = text.trim_start_matches(':');
    let mut sections = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b':' if depth == 0 => {
                sections.push(text[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() || !sections.is_empty() {
        sections.push(tail.to_string());
    }
    Ok(sections)
}

fn parse_operand_list(section: &str) -> Result<Vec<AsmOperand>, AsmParseError> {
    let section = section.trim();
    if section.is_empty() {
        return Ok(Vec::new());
    }
    section
        .split(',')
        .map(|item| {
            let item = item.trim();
            let quote_start = item
                .find('"')
                .ok_or_else(|| AsmParseError::MalformedOperand(item.to_string()))?;
            let after_quote = &item[quote_start + 1..];
            let quote_end = after_quote
                .find('"')
                .ok_or_else(|| AsmParseError::MalformedOperand(item.to_string()))?;
            let constraint = after_quote[..quote_end].to_string();
            let expr = item[quote_start + 1 + quote_end + 1..]
                .trim()
                .trim_matches(|c| c == '(' || c == ')')
                .to_string();
            Ok(AsmOperand { constraint, expr })
        })
        .collect()
}

fn parse_clobber_list(section: &str) -> Vec<String> {
    section
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
}

pub fn detected_arch() -> Arch {
    if cfg!(target_arch = "aarch64") {
        Arch::Aarch64
    } else {
        Arch::X86_64
    }
}

const X86_64_REGISTERS: &[&str] = &[
    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15", "eax", "ebx", "ecx", "edx", "esi", "edi",
];

const AARCH64_REGISTERS: &[&str] = &[
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
    "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26",
    "x27", "x28", "x29", "x30", "sp",
];

/// Validates a register name named inside a `"r"(...)` style constraint
/// against the detected architecture's register set.
pub fn is_valid_register_name(name: &str, arch: Arch) -> bool {
    let table = match arch {
        Arch::X86_64 => X86_64_REGISTERS,
        Arch::Aarch64 => AARCH64_REGISTERS,
    };
    table.contains(&name)
}

/// Validates a GCC-style constraint string (e.g. `"r"`, `"=r"`, `"+m"`)
/// for well-formedness — does not attempt to validate that the
/// constrained expression matches the constraint's class.
pub fn validate_constraint(constraint: &str) -> bool {
    if constraint.is_empty() {
        return false;
    }
    let body = constraint.trim_start_matches(['=', '+', '&']);
    !body.is_empty()
        && body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '{' || c == '}')
}

#[cfg(target_arch = "x86_64")]
pub fn cpuid(leaf: u32) -> (u32, u32, u32, u32) {
    let result = unsafe { std::arch::x86_64::__cpuid(leaf) };
    (result.eax, result.ebx, result.ecx, result.edx)
}

#[cfg(not(target_arch = "x86_64"))]
pub fn cpuid(_leaf: u32) -> (u32, u32, u32, u32) {
    (0, 0, 0, 0)
}

#[cfg(target_arch = "x86_64")]
pub fn rdtsc() -> u64 {
    unsafe { std::arch::x86_64::_rdtsc() }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn rdtsc() -> u64 {
    0
}

/// A full memory fence, the back-architecture helper extended-asm blocks
/// most commonly reach for (`mfence` / `dmb ish`).
pub fn memory_fence() {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_block_with_all_three_sections() {
        let block = parse_extended_asm(
            r#""addl %1, %0" : "=r"(sum) : "r"(a) : "cc""#,
        )
        .unwrap();
        assert_eq!(block.template, "addl %1, %0");
        assert_eq!(block.outputs.len(), 1);
        assert_eq!(block.outputs[0].constraint, "=r");
        assert_eq!(block.outputs[0].expr, "sum");
        assert_eq!(block.inputs.len(), 1);
        assert_eq!(block.clobbers, vec!["cc".to_string()]);
    }

    #[test]
    fn parses_a_block_with_only_a_template() {
        let block = parse_extended_asm(r#""nop""#).unwrap();
        assert_eq!(block.template, "nop");
        assert!(block.outputs.is_empty());
        assert!(block.inputs.is_empty());
        assert!(block.clobbers.is_empty());
    }

    #[test]
    fn rejects_a_block_missing_its_closing_quote() {
        let result = parse_extended_asm(r#""nop"#);
        assert_eq!(result, Err(AsmParseError::UnterminatedTemplate));
    }

    #[test]
    fn validates_known_register_names_per_architecture() {
        assert!(is_valid_register_name("rax", Arch::X86_64));
        assert!(!is_valid_register_name("x0", Arch::X86_64));
        assert!(is_valid_register_name("x0", Arch::Aarch64));
    }

    #[test]
    fn validates_constraint_syntax() {
        assert!(validate_constraint("r"));
        assert!(validate_constraint("=r"));
        assert!(validate_constraint("+m"));
        assert!(!validate_constraint(""));
        assert!(!validate_constraint("="));
    }
}
