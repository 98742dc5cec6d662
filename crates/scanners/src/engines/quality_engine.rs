//! Code-quality metrics over contract source.
//!
//! Five independent sub-checks (complexity, documentation, naming,
//! structure, best practices), each producing its own metrics, issues and
//! penalty. The aggregate score is 100 minus the summed penalties, and the
//! recommendations list names every threshold that was crossed.

use crate::core::{EngineKind, EngineResult, Finding, Location, ScanRequest, Severity};
use crate::engines::Engine;
use anyhow::{bail, Result};
use regex::Regex;
use serde_json::json;

const AVG_COMPLEXITY_THRESHOLD: f64 = 10.0;
const COMMENT_RATIO_THRESHOLD: f64 = 0.10;
const NATSPEC_COVERAGE_THRESHOLD: f64 = 0.5;
const MAX_FILE_LINES: usize = 500;
const MAX_FUNCTION_LINES: usize = 50;
const MAX_NESTING_DEPTH: i32 = 5;
const NAMING_PENALTY_CAP: u32 = 10;
const UNUSED_VAR_PENALTY_CAP: u32 = 10;

struct SubcheckOutcome {
    metrics: serde_json::Value,
    issues: Vec<Finding>,
    penalty: u32,
    recommendations: Vec<String>,
}

pub struct QualityEngine {
    function_re: Regex,
    contract_name_re: Regex,
    variable_decl_re: Regex,
    local_init_re: Regex,
    mixed_case_re: Regex,
    cap_words_re: Regex,
    screaming_re: Regex,
}

impl QualityEngine {
    pub fn new() -> Self {
        Self {
            function_re: Regex::new(r"\bfunction\s+([A-Za-z_][A-Za-z0-9_]*)")
                .expect("valid built-in pattern"),
            contract_name_re: Regex::new(r"\b(?:contract|interface|library)\s+([A-Za-z_]\w*)")
                .expect("valid built-in pattern"),
            variable_decl_re: Regex::new(
                r"(?m)^\s*(?:uint\d*|int\d*|address|bool|bytes\d*|string)\s+(?:(?:public|private|internal|constant|immutable|memory|storage)\s+)*([A-Za-z_]\w*)\s*[;=]",
            )
            .expect("valid built-in pattern"),
            local_init_re: Regex::new(
                r"\b(?:uint\d*|int\d*|address|bool|bytes\d*|string(?:\s+memory)?)\s+([a-zA-Z_]\w*)\s*=",
            )
            .expect("valid built-in pattern"),
            mixed_case_re: Regex::new(r"^_?[a-z][a-zA-Z0-9]*$").expect("valid built-in pattern"),
            cap_words_re: Regex::new(r"^[A-Z][a-zA-Z0-9]*$").expect("valid built-in pattern"),
            screaming_re: Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("valid built-in pattern"),
        }
    }

    fn functions(&self, source: &str) -> Vec<FunctionInfo> {
        let mut functions = Vec::new();

        for caps in self.function_re.captures_iter(source) {
            let whole = caps.get(0).expect("regex has a whole match");
            let name = caps.get(1).map_or("", |c| c.as_str()).to_string();
            let rest = &source[whole.start()..];

            let Some(body_open) = rest.find('{') else {
                continue; // abstract signature, no body
            };
            if let Some(semi) = rest.find(';') {
                if semi < body_open {
                    continue;
                }
            }

            let mut depth = 0i32;
            let mut body_end = rest.len();
            for (offset, ch) in rest[body_open..].char_indices() {
                match ch {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            body_end = body_open + offset + 1;
                            break;
                        }
                    }
                    _ => {}
                }
            }

            let body = rest[body_open..body_end].to_string();
            let start_line = source[..whole.start()].matches('\n').count() + 1;
            functions.push(FunctionInfo {
                name,
                start_line,
                body,
            });
        }

        functions
    }

    fn check_complexity(&self, functions: &[FunctionInfo]) -> SubcheckOutcome {
        const WEIGHTS: [(&str, u32); 6] = [
            ("if", 1),
            ("for", 2),
            ("while", 2),
            ("&&", 1),
            ("||", 1),
            ("?", 1),
        ];

        let mut total = 0u32;
        let mut max = 0u32;
        let mut max_name = String::new();

        for function in functions {
            let mut complexity = 1u32;
            for line in function.body.lines() {
                for (keyword, weight) in WEIGHTS {
                    complexity += weight * count_tokens(line, keyword) as u32;
                }
            }
            total += complexity;
            if complexity > max {
                max = complexity;
                max_name = function.name.clone();
            }
        }

        let average = if functions.is_empty() {
            0.0
        } else {
            total as f64 / functions.len() as f64
        };

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut penalty = 0;
        if average > AVG_COMPLEXITY_THRESHOLD {
            penalty = 10;
            issues.push(Finding::new(
                EngineKind::Quality,
                "high_complexity",
                Severity::Medium,
                "high average function complexity",
                format!(
                    "Average keyword-weighted complexity is {average:.1}, above the \
                     threshold of {AVG_COMPLEXITY_THRESHOLD}; `{max_name}` is the worst at {max}."
                ),
            ));
            recommendations
                .push("Split branching-heavy functions into smaller units.".to_string());
        }

        SubcheckOutcome {
            metrics: json!({
                "functionCount": functions.len(),
                "averageComplexity": (average * 10.0).round() / 10.0,
                "maxComplexity": max,
                "maxComplexityFunction": max_name,
            }),
            issues,
            penalty,
            recommendations,
        }
    }

    fn check_documentation(&self, source: &str, function_count: usize) -> SubcheckOutcome {
        let mut comment_lines = 0usize;
        let mut code_lines = 0usize;
        let mut natspec_markers = 0usize;
        let mut in_block = false;

        for raw_line in source.lines() {
            let trimmed = raw_line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if in_block {
                comment_lines += 1;
                if trimmed.contains("*/") {
                    in_block = false;
                }
                continue;
            }
            if trimmed.starts_with("///") {
                comment_lines += 1;
                natspec_markers += 1;
            } else if trimmed.starts_with("/**") {
                comment_lines += 1;
                natspec_markers += 1;
                in_block = !trimmed.contains("*/");
            } else if trimmed.starts_with("//") || trimmed.starts_with("/*") {
                comment_lines += 1;
                in_block = trimmed.starts_with("/*") && !trimmed.contains("*/");
            } else {
                code_lines += 1;
            }
        }

        let ratio = if code_lines > 0 {
            comment_lines as f64 / code_lines as f64
        } else {
            0.0
        };
        let coverage = if function_count > 0 {
            natspec_markers as f64 / function_count as f64
        } else {
            1.0
        };

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut penalty = 0;

        if code_lines > 0 && ratio < COMMENT_RATIO_THRESHOLD {
            penalty += 5;
            issues.push(Finding::new(
                EngineKind::Quality,
                "sparse_comments",
                Severity::Low,
                "low comment-to-code ratio",
                format!(
                    "{comment_lines} comment lines against {code_lines} code lines \
                     ({:.0}% ratio).",
                    ratio * 100.0
                ),
            ));
            recommendations.push("Comment non-obvious logic, aiming for at least 10%.".to_string());
        }
        if function_count > 0 && coverage < NATSPEC_COVERAGE_THRESHOLD {
            penalty += 5;
            issues.push(Finding::new(
                EngineKind::Quality,
                "missing_natspec",
                Severity::Info,
                "functions without NatSpec annotations",
                format!(
                    "{natspec_markers} NatSpec annotations for {function_count} functions."
                ),
            ));
            recommendations.push("Annotate public functions with NatSpec.".to_string());
        }

        SubcheckOutcome {
            metrics: json!({
                "commentLines": comment_lines,
                "codeLines": code_lines,
                "commentRatio": (ratio * 100.0).round() / 100.0,
                "natspecMarkers": natspec_markers,
            }),
            issues,
            penalty,
            recommendations,
        }
    }

    fn check_naming(&self, source: &str, functions: &[FunctionInfo]) -> SubcheckOutcome {
        let mut violations: Vec<String> = Vec::new();

        for caps in self.contract_name_re.captures_iter(source) {
            let name = &caps[1];
            if !self.cap_words_re.is_match(name) {
                violations.push(format!("contract `{name}` is not CapWords"));
            }
        }
        for function in functions {
            if !self.mixed_case_re.is_match(&function.name) {
                violations.push(format!("function `{}` is not mixedCase", function.name));
            }
        }
        for caps in self.variable_decl_re.captures_iter(source) {
            let name = &caps[1];
            if !self.mixed_case_re.is_match(name) && !self.screaming_re.is_match(name) {
                violations.push(format!("variable `{name}` is not mixedCase"));
            }
        }

        let penalty = (2 * violations.len() as u32).min(NAMING_PENALTY_CAP);
        let issues = violations
            .iter()
            .map(|violation| {
                Finding::new(
                    EngineKind::Quality,
                    "naming_convention",
                    Severity::Info,
                    "naming convention violation",
                    violation.clone(),
                )
            })
            .collect();

        let recommendations = if violations.is_empty() {
            Vec::new()
        } else {
            vec!["Follow Solidity naming conventions (CapWords contracts, mixedCase members)."
                .to_string()]
        };

        SubcheckOutcome {
            metrics: json!({
                "violations": violations.len(),
            }),
            issues,
            penalty,
            recommendations,
        }
    }

    fn check_structure(&self, source: &str, functions: &[FunctionInfo]) -> SubcheckOutcome {
        let file_lines = source.lines().count();

        let mut depth = 0i32;
        let mut max_depth = 0i32;
        for ch in source.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    max_depth = max_depth.max(depth);
                }
                '}' => depth -= 1,
                _ => {}
            }
        }

        let long_functions: Vec<&FunctionInfo> = functions
            .iter()
            .filter(|f| f.body.lines().count() > MAX_FUNCTION_LINES)
            .collect();

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut penalty = 0;

        if file_lines > MAX_FILE_LINES {
            penalty += 5;
            issues.push(Finding::new(
                EngineKind::Quality,
                "long_file",
                Severity::Low,
                "file exceeds length threshold",
                format!("{file_lines} lines against a threshold of {MAX_FILE_LINES}."),
            ));
            recommendations.push("Split the contract across files or libraries.".to_string());
        }
        if let Some(worst) = long_functions.first() {
            penalty += 5;
            issues.push(
                Finding::new(
                    EngineKind::Quality,
                    "long_function",
                    Severity::Low,
                    "function exceeds length threshold",
                    format!(
                        "{} function(s) longer than {MAX_FUNCTION_LINES} lines; \
                         `{}` spans {}.",
                        long_functions.len(),
                        worst.name,
                        worst.body.lines().count()
                    ),
                )
                .with_location(Location::new(worst.start_line, 1)),
            );
            recommendations.push("Break long functions into helpers.".to_string());
        }
        if max_depth > MAX_NESTING_DEPTH {
            penalty += 5;
            issues.push(Finding::new(
                EngineKind::Quality,
                "deep_nesting",
                Severity::Low,
                "deep brace nesting",
                format!("Maximum nesting depth {max_depth} exceeds {MAX_NESTING_DEPTH}."),
            ));
            recommendations.push("Flatten control flow with early returns.".to_string());
        }

        SubcheckOutcome {
            metrics: json!({
                "fileLines": file_lines,
                "maxNestingDepth": max_depth,
                "longFunctions": long_functions.len(),
            }),
            issues,
            penalty,
            recommendations,
        }
    }

    fn check_best_practices(&self, source: &str) -> SubcheckOutcome {
        let has_pragma = source.contains("pragma solidity");
        let has_license = source.contains("SPDX-License-Identifier");
        let assert_count = count_tokens(source, "assert(");
        let require_count = count_tokens(source, "require(");

        let mut unused: Vec<String> = Vec::new();
        for caps in self.local_init_re.captures_iter(source) {
            let name = caps[1].to_string();
            let reference_re =
                Regex::new(&format!(r"\b{}\b", regex::escape(&name))).expect("escaped identifier");
            if reference_re.find_iter(source).count() == 1 && !unused.contains(&name) {
                unused.push(name);
            }
        }

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut penalty = 0;

        if !has_pragma {
            penalty += 5;
            issues.push(Finding::new(
                EngineKind::Quality,
                "missing_pragma",
                Severity::Low,
                "no version pragma",
                "The source declares no solidity version pragma.",
            ));
            recommendations.push("Pin a compiler version with a pragma.".to_string());
        }
        if !has_license {
            penalty += 3;
            issues.push(Finding::new(
                EngineKind::Quality,
                "missing_license",
                Severity::Info,
                "no SPDX license identifier",
                "The source carries no SPDX-License-Identifier comment.",
            ));
            recommendations.push("Add an SPDX license identifier.".to_string());
        }
        if assert_count > 0 && assert_count > require_count {
            penalty += 4;
            issues.push(Finding::new(
                EngineKind::Quality,
                "assert_overuse",
                Severity::Low,
                "assert used more than require",
                format!(
                    "{assert_count} assert() against {require_count} require(); assert \
                     consumes all gas on failure and signals an internal invariant."
                ),
            ));
            recommendations.push("Validate inputs with require, reserve assert for invariants."
                .to_string());
        }

        let unused_penalty = (2 * unused.len() as u32).min(UNUSED_VAR_PENALTY_CAP);
        penalty += unused_penalty;
        for name in &unused {
            issues.push(Finding::new(
                EngineKind::Quality,
                "unused_variable",
                Severity::Info,
                "variable assigned but never read",
                format!("`{name}` is initialized and then never referenced again."),
            ));
        }
        if !unused.is_empty() {
            recommendations.push("Remove unused variables.".to_string());
        }

        SubcheckOutcome {
            metrics: json!({
                "hasPragma": has_pragma,
                "hasLicense": has_license,
                "assertCount": assert_count,
                "requireCount": require_count,
                "unusedVariables": unused,
            }),
            issues,
            penalty,
            recommendations,
        }
    }
}

impl Default for QualityEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for QualityEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Quality
    }

    fn applicable(&self, request: &ScanRequest) -> bool {
        request.has_source()
    }

    fn analyze(&self, request: &ScanRequest) -> Result<EngineResult> {
        let Some(source) = request.source_code.as_deref() else {
            bail!("quality engine requires source code");
        };

        let functions = self.functions(source);

        let outcomes = [
            ("complexity", self.check_complexity(&functions)),
            (
                "documentation",
                self.check_documentation(source, functions.len()),
            ),
            ("naming", self.check_naming(source, &functions)),
            ("structure", self.check_structure(source, &functions)),
            ("bestPractices", self.check_best_practices(source)),
        ];

        let mut findings = Vec::new();
        let mut recommendations = Vec::new();
        let mut penalty = 0u32;
        let mut metric_map = serde_json::Map::new();

        for (key, outcome) in outcomes {
            penalty += outcome.penalty;
            findings.extend(outcome.issues);
            recommendations.extend(outcome.recommendations);
            metric_map.insert(key.to_string(), outcome.metrics);
        }
        metric_map.insert("recommendations".to_string(), json!(recommendations));

        let score = 100u32.saturating_sub(penalty) as u8;

        Ok(EngineResult::completed(
            EngineKind::Quality,
            score,
            findings,
            serde_json::Value::Object(metric_map),
        ))
    }
}

struct FunctionInfo {
    name: String,
    start_line: usize,
    body: String,
}

fn count_tokens(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(source: &str) -> EngineResult {
        let request = ScanRequest::new("0xabc", "hash").with_source(source);
        QualityEngine::new().analyze(&request).unwrap()
    }

    const DOCUMENTED: &str = r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.20;

/// @title A well-kept vault
/// @notice Holds deposits for its owner
contract Vault {
    address public owner;
    uint256 public total;

    constructor() {
        owner = msg.sender;
    }

    /// @notice Accept a deposit
    function deposit() public payable {
        require(msg.value > 0, "empty deposit");
        total += msg.value;
    }

    /// @notice Owner-only sweep
    function sweep() external {
        require(msg.sender == owner, "not owner");
        payable(owner).transfer(address(this).balance);
    }
}
"#;

    #[test]
    fn documented_contract_scores_clean() {
        let result = analyze(DOCUMENTED);
        assert_eq!(result.score, 100, "findings: {:?}", result.findings);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn missing_pragma_and_license_are_flagged() {
        let result = analyze(
            "/// @notice doc\n/// @notice doc\ncontract C {\n    /// doc\n    function f() public { require(true); }\n}\n",
        );
        let types: Vec<_> = result
            .findings
            .iter()
            .map(|f| f.finding_type.as_str())
            .collect();
        assert!(types.contains(&"missing_pragma"));
        assert!(types.contains(&"missing_license"));
        assert_eq!(result.score, 92);
    }

    #[test]
    fn naming_violations_are_reported() {
        let result = analyze(
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\n// c\n// c\ncontract bad_name {\n    /// doc\n    function Bad_Function() public {}\n}\n",
        );
        let naming: Vec<_> = result
            .findings
            .iter()
            .filter(|f| f.finding_type == "naming_convention")
            .collect();
        assert_eq!(naming.len(), 2);
    }

    #[test]
    fn unused_local_variable_is_detected() {
        let result = analyze(
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\n// c\n// c\ncontract C {\n    /// doc\n    function f() public {\n        uint256 ghost = 41;\n    }\n}\n",
        );
        assert!(result
            .findings
            .iter()
            .any(|f| f.finding_type == "unused_variable" && f.description.contains("ghost")));
    }

    #[test]
    fn assert_overuse_is_flagged() {
        let result = analyze(
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\n// c\n// c\ncontract C {\n    /// doc\n    function f() public {\n        assert(1 == 1);\n        assert(2 == 2);\n    }\n}\n",
        );
        assert!(result
            .findings
            .iter()
            .any(|f| f.finding_type == "assert_overuse"));
    }

    #[test]
    fn deep_nesting_is_flagged() {
        let result = analyze(
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\n// c\n// c\ncontract C {\n    /// doc\n    function f() public {\n        if (true) { if (true) { if (true) { if (true) { if (true) { require(true); } } } } }\n    }\n}\n",
        );
        assert!(result
            .findings
            .iter()
            .any(|f| f.finding_type == "deep_nesting"));
    }

    #[test]
    fn empty_source_stays_in_range() {
        let result = analyze("");
        assert!(result.score <= 100);
    }

    #[test]
    fn recommendations_track_crossed_thresholds() {
        let result = analyze("contract C {\n    function f() public {}\n}\n");
        let recommendations = result.metrics["recommendations"].as_array().unwrap();
        assert!(!recommendations.is_empty());
    }
}
