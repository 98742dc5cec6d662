//! Pattern- and heuristic-based source analysis.
//!
//! This is a heuristic detector, not semantic analysis: it matches a fixed
//! table of vulnerability patterns line-by-line and applies two textual
//! heuristics (visibility/ownership checks, unassigned state variables).
//! False positives and negatives are an accepted property of the approach.

use crate::core::{EngineKind, EngineResult, Finding, Location, ScanRequest, Severity};
use crate::engines::Engine;
use anyhow::{bail, Result};
use regex::Regex;
use serde_json::json;

const PARSE_ERROR_PENALTY: u32 = 10;
const PATTERN_MATCH_PENALTY: u32 = 15;
const ACCESS_CONTROL_PENALTY: u32 = 10;
const STATE_VAR_PENALTY: u32 = 5;

/// One entry of the injectable detector table. Tests substitute synthetic
/// tables without touching engine logic.
pub struct DetectorPattern {
    pub finding_type: String,
    pub pattern: Regex,
    pub severity: Severity,
    pub description: String,
    pub remediation: Option<String>,
}

impl DetectorPattern {
    pub fn new(
        finding_type: impl Into<String>,
        pattern: Regex,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            finding_type: finding_type.into(),
            pattern,
            severity,
            description: description.into(),
            remediation: None,
        }
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }
}

pub struct StaticEngine {
    patterns: Vec<DetectorPattern>,
    function_re: Regex,
    visibility_re: Regex,
    ownership_re: Regex,
    contract_re: Regex,
    state_var_re: Regex,
}

impl StaticEngine {
    pub fn new() -> Self {
        Self::with_patterns(default_patterns())
    }

    pub fn with_patterns(patterns: Vec<DetectorPattern>) -> Self {
        Self {
            patterns,
            function_re: Regex::new(r"\bfunction\s+([A-Za-z_][A-Za-z0-9_]*)")
                .expect("valid built-in pattern"),
            visibility_re: Regex::new(r"\b(public|private|internal|external)\b")
                .expect("valid built-in pattern"),
            ownership_re: Regex::new(
                r"onlyOwner|Ownable|AccessControl|require\s*\(\s*msg\.sender|msg\.sender\s*==",
            )
            .expect("valid built-in pattern"),
            contract_re: Regex::new(r"\bcontract\s+[A-Za-z_]").expect("valid built-in pattern"),
            state_var_re: Regex::new(
                r"^\s*(?:uint\d*|int\d*|address|bool|bytes\d*|string|mapping\s*\([^)]*\))\s+(?:(?:public|private|internal|constant|immutable)\s+)*([A-Za-z_]\w*)\s*;",
            )
            .expect("valid built-in pattern"),
        }
    }

    /// Lightweight structural check: balanced `{}()[]`, terminated strings
    /// and block comments. Not a real parser; a contract that fails here is
    /// reported once and skipped by the pattern table, because a malformed
    /// file cannot be meaningfully pattern-matched further.
    fn check_syntax(&self, source: &str) -> Result<(), SyntaxIssue> {
        let mut stack: Vec<(char, usize)> = Vec::new();
        let mut line = 1usize;
        let mut in_line_comment = false;
        let mut in_block_comment = false;
        let mut block_comment_line = 0usize;
        let mut string_quote: Option<char> = None;
        let mut escaped = false;
        let mut prev = '\0';

        for ch in source.chars() {
            if ch == '\n' {
                if string_quote.is_some() {
                    return Err(SyntaxIssue::new(line, "unterminated string literal"));
                }
                line += 1;
                in_line_comment = false;
                prev = '\0';
                continue;
            }

            if in_line_comment {
                continue;
            }
            if in_block_comment {
                if prev == '*' && ch == '/' {
                    in_block_comment = false;
                    prev = '\0';
                } else {
                    prev = ch;
                }
                continue;
            }
            if let Some(quote) = string_quote {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == quote {
                    string_quote = None;
                }
                prev = ch;
                continue;
            }

            match ch {
                '/' if prev == '/' => in_line_comment = true,
                '*' if prev == '/' => {
                    in_block_comment = true;
                    block_comment_line = line;
                }
                '"' | '\'' => string_quote = Some(ch),
                '{' | '(' | '[' => stack.push((ch, line)),
                '}' | ')' | ']' => {
                    let expected = match ch {
                        '}' => '{',
                        ')' => '(',
                        _ => '[',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => {
                            return Err(SyntaxIssue::new(
                                line,
                                format!("unexpected `{ch}`"),
                            ))
                        }
                    }
                }
                _ => {}
            }
            prev = ch;
        }

        if in_block_comment {
            return Err(SyntaxIssue::new(block_comment_line, "unterminated block comment"));
        }
        if let Some((open, open_line)) = stack.last() {
            return Err(SyntaxIssue::new(*open_line, format!("unclosed `{open}`")));
        }
        Ok(())
    }

    fn scan_patterns(&self, source: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        for (idx, raw_line) in source.lines().enumerate() {
            let trimmed = raw_line.trim_start();
            if trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*") {
                continue;
            }

            for pattern in &self.patterns {
                if let Some(m) = pattern.pattern.find(raw_line) {
                    let mut finding = Finding::new(
                        EngineKind::Static,
                        pattern.finding_type.clone(),
                        pattern.severity,
                        pattern.finding_type.replace('_', " "),
                        pattern.description.clone(),
                    )
                    .with_location(
                        Location::new(idx + 1, m.start() + 1).with_snippet(raw_line.trim()),
                    );
                    if let Some(remediation) = &pattern.remediation {
                        finding = finding.with_remediation(remediation.clone());
                    }
                    findings.push(finding);
                }
            }
        }

        findings
    }

    fn scan_access_control(&self, source: &str) -> (Vec<Finding>, usize) {
        let mut findings = Vec::new();
        let mut functions_total = 0usize;

        for caps in self.function_re.captures_iter(source) {
            functions_total += 1;
            let whole = caps.get(0).expect("regex has a whole match");
            let name = caps.get(1).map_or("", |c| c.as_str());

            // Declaration header: everything up to the body or the
            // terminating `;` of an abstract signature.
            let rest = &source[whole.start()..];
            let header_end = rest
                .find(|c: char| c == '{' || c == ';')
                .unwrap_or(rest.len().min(256));
            let header = &rest[..header_end];

            if !self.visibility_re.is_match(header) {
                let (line, column) = line_col(source, whole.start());
                let snippet = source.lines().nth(line - 1).unwrap_or("").trim();
                findings.push(
                    Finding::new(
                        EngineKind::Static,
                        "missing_visibility",
                        Severity::Medium,
                        "function without explicit visibility",
                        format!(
                            "Function `{name}` does not declare a visibility qualifier; \
                             it defaults to public exposure."
                        ),
                    )
                    .with_location(Location::new(line, column).with_snippet(snippet))
                    .with_remediation("Declare the function public, external, internal or private."),
                );
            }
        }

        if self.contract_re.is_match(source) && !self.ownership_re.is_match(source) {
            findings.push(
                Finding::new(
                    EngineKind::Static,
                    "missing_access_control",
                    Severity::Medium,
                    "no ownership or authorization idiom",
                    "No ownership or role-check pattern appears anywhere in the contract; \
                     state-changing functions may be callable by anyone.",
                )
                .with_location(Location::new(1, 1))
                .with_remediation(
                    "Guard privileged functions with an owner or role check.",
                ),
            );
        }

        (findings, functions_total)
    }

    fn scan_state_variables(&self, source: &str) -> (Vec<Finding>, usize) {
        let mut findings = Vec::new();
        let mut declared = 0usize;
        let mut depth = 0i32;

        for (idx, raw_line) in source.lines().enumerate() {
            // Contract-level declarations live at brace depth 1; anything
            // deeper is a function body.
            if depth == 1 {
                if let Some(caps) = self.state_var_re.captures(raw_line) {
                    declared += 1;
                    let name = caps.get(1).map_or("", |m| m.as_str());
                    let assigned_re = Regex::new(&format!(
                        r"\b{}\s*(?:\[[^\]]*\]\s*)?(?:=[^=>]|\+=|-=|\*=|/=|\+\+|--)",
                        regex::escape(name)
                    ))
                    .expect("escaped identifier pattern");

                    if !assigned_re.is_match(source) {
                        findings.push(
                            Finding::new(
                                EngineKind::Static,
                                "uninitialized_state",
                                Severity::Low,
                                "state variable never assigned",
                                format!(
                                    "State variable `{name}` is declared but never the target \
                                     of an assignment anywhere in the source."
                                ),
                            )
                            .with_location(
                                Location::new(idx + 1, 1).with_snippet(raw_line.trim()),
                            ),
                        );
                    }
                }
            }

            for ch in raw_line.chars() {
                match ch {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
            }
        }

        (findings, declared)
    }
}

impl Default for StaticEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for StaticEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Static
    }

    fn applicable(&self, request: &ScanRequest) -> bool {
        request.has_source()
    }

    fn analyze(&self, request: &ScanRequest) -> Result<EngineResult> {
        let Some(source) = request.source_code.as_deref() else {
            bail!("static engine requires source code");
        };

        let mut findings = Vec::new();
        let mut parse_errors = 0u32;
        let mut pattern_matches = 0u32;

        let parse_result = self.check_syntax(source);
        if let Err(issue) = &parse_result {
            parse_errors = 1;
            findings.push(
                Finding::new(
                    EngineKind::Static,
                    "syntax_error",
                    Severity::High,
                    "source failed structural parse",
                    format!("Parse failed at line {}: {}", issue.line, issue.message),
                )
                .with_location(Location::new(issue.line, 1)),
            );
        } else {
            let matched = self.scan_patterns(source);
            pattern_matches = matched.len() as u32;
            findings.extend(matched);
        }

        let (access_findings, functions_total) = self.scan_access_control(source);
        let access_count = access_findings.len() as u32;
        findings.extend(access_findings);

        let (state_findings, state_vars_declared) = self.scan_state_variables(source);
        let state_count = state_findings.len() as u32;
        findings.extend(state_findings);

        let penalty = PARSE_ERROR_PENALTY * parse_errors
            + PATTERN_MATCH_PENALTY * pattern_matches
            + ACCESS_CONTROL_PENALTY * access_count
            + STATE_VAR_PENALTY * state_count;
        let score = 100u32.saturating_sub(penalty) as u8;

        let metrics = json!({
            "linesScanned": source.lines().count(),
            "patternsEvaluated": self.patterns.len(),
            "patternMatches": pattern_matches,
            "functionsChecked": functions_total,
            "accessControlFindings": access_count,
            "stateVariablesDeclared": state_vars_declared,
            "stateVariablesUnassigned": state_count,
            "parseOk": parse_result.is_ok(),
        });

        Ok(EngineResult::completed(
            EngineKind::Static,
            score,
            findings,
            metrics,
        ))
    }
}

struct SyntaxIssue {
    line: usize,
    message: String,
}

impl SyntaxIssue {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = offset - before.rfind('\n').map_or(0, |i| i + 1) + 1;
    (line, column)
}

/// The built-in detector table. Constructor-injected so tests can swap in
/// synthetic entries; the entries themselves are fixed at build time.
pub fn default_patterns() -> Vec<DetectorPattern> {
    vec![
        DetectorPattern::new(
            "reentrancy",
            Regex::new(r"\.call\{").expect("valid built-in pattern"),
            Severity::High,
            "Low-level call that forwards value; state written after this call \
             can be re-entered before it is finalized.",
        )
        .with_remediation("Apply checks-effects-interactions or a reentrancy guard."),
        DetectorPattern::new(
            "tx_origin",
            Regex::new(r"tx\.origin").expect("valid built-in pattern"),
            Severity::High,
            "Authorization via tx.origin is phishable; an intermediate contract \
             inherits the original sender's identity.",
        )
        .with_remediation("Authorize against msg.sender instead of tx.origin."),
        DetectorPattern::new(
            "delegatecall",
            Regex::new(r"\.delegatecall\s*\(").expect("valid built-in pattern"),
            Severity::High,
            "delegatecall executes foreign code in this contract's storage context.",
        )
        .with_remediation("Restrict delegatecall targets to audited, immutable addresses."),
        DetectorPattern::new(
            "selfdestruct",
            Regex::new(r"\b(?:selfdestruct|suicide)\s*\(").expect("valid built-in pattern"),
            Severity::High,
            "selfdestruct removes the contract and force-sends its balance.",
        ),
        DetectorPattern::new(
            "timestamp_dependence",
            Regex::new(r"block\.timestamp").expect("valid built-in pattern"),
            Severity::Medium,
            "block.timestamp is miner-influenced within a small window.",
        ),
        DetectorPattern::new(
            "unchecked_send",
            Regex::new(r"\.send\s*\(").expect("valid built-in pattern"),
            Severity::Medium,
            "send returns a bool that is commonly left unchecked and forwards \
             a fixed 2300 gas stipend.",
        )
        .with_remediation("Check the return value or use call with an explicit gas budget."),
    ]
}
