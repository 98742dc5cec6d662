//! Structural and opcode-frequency heuristics over a bytecode hex string.
//!
//! This engine never executes or disassembles anything: it scans the
//! literal hex text for opcode byte values on aligned pairs, so PUSH
//! immediates can and do produce false positives. That trade-off is
//! deliberate and documented; a real decoder would be a separate component
//! over an instruction stream, not a change to this engine.

use crate::core::{EngineKind, EngineResult, Finding, Location, ScanRequest, Severity};
use crate::engines::Engine;
use anyhow::{bail, Result};
use regex::Regex;
use serde_json::json;

const STRUCTURAL_PENALTY: u32 = 10;
const OPCODE_PENALTY: u32 = 15;
const STATE_PENALTY: u32 = 12;
const CONTROL_FLOW_PENALTY: u32 = 8;

/// Below this many hex chars the artifact is too small to be a deployed
/// contract of any substance.
const MIN_BYTECODE_HEX_CHARS: usize = 100;

/// EIP-1167 minimal proxy marker.
const MINIMAL_PROXY_MARKER: &str = "363d3d373d3d3d363d73";

const EXTERNAL_CALL_THRESHOLD: usize = 5;
const SLOAD_DENSITY_THRESHOLD: f64 = 0.08;
const SSTORE_DENSITY_THRESHOLD: f64 = 0.05;
const STORAGE_MIN_COUNT: usize = 8;
const CYCLOMATIC_THRESHOLD: usize = 20;
const MAX_SELECTORS: usize = 10;

pub struct DynamicEngine {
    selector_re: Regex,
}

impl DynamicEngine {
    pub fn new() -> Self {
        Self {
            // PUSH4 followed by four bytes: candidate function selector.
            selector_re: Regex::new(r"63([0-9a-f]{8})").expect("valid built-in pattern"),
        }
    }

    fn structural_findings(&self, hex: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        if hex.len() < MIN_BYTECODE_HEX_CHARS {
            findings.push(
                Finding::new(
                    EngineKind::Dynamic,
                    "minimal_bytecode",
                    Severity::Low,
                    "bytecode below minimum size",
                    format!(
                        "Submitted bytecode is {} hex chars; deployed contracts of any \
                         substance exceed {}. The artifact may be a stub or an EOA.",
                        hex.len(),
                        MIN_BYTECODE_HEX_CHARS
                    ),
                )
                .with_location(Location::new(1, 1)),
            );
        }

        if hex.contains(MINIMAL_PROXY_MARKER) {
            findings.push(
                Finding::new(
                    EngineKind::Dynamic,
                    "proxy_pattern",
                    Severity::Medium,
                    "minimal proxy bytecode detected",
                    "The EIP-1167 minimal-proxy marker is present; all logic lives in a \
                     delegate target that this analysis cannot see.",
                )
                .with_location(Location::new(1, 1))
                .with_remediation("Analyze the implementation contract behind the proxy."),
            );
        }

        findings
    }

    fn opcode_findings(&self, ops: &OpcodeCounts) -> Vec<Finding> {
        let mut findings = Vec::new();

        if ops.selfdestruct > 0 {
            findings.push(Finding::new(
                EngineKind::Dynamic,
                "selfdestruct_opcode",
                Severity::High,
                "SELFDESTRUCT opcode present",
                format!(
                    "{} occurrence(s) of the SELFDESTRUCT byte; the contract can be \
                     removed and its balance force-sent.",
                    ops.selfdestruct
                ),
            ));
        }
        if ops.delegatecall > 0 {
            findings.push(Finding::new(
                EngineKind::Dynamic,
                "delegatecall_opcode",
                Severity::High,
                "DELEGATECALL opcode present",
                format!(
                    "{} occurrence(s) of the DELEGATECALL byte; foreign code can run \
                     in this contract's storage context.",
                    ops.delegatecall
                ),
            ));
        }
        if ops.external_calls() > EXTERNAL_CALL_THRESHOLD {
            findings.push(Finding::new(
                EngineKind::Dynamic,
                "high_call_density",
                Severity::Medium,
                "many external call opcodes",
                format!(
                    "{} CALL-family bytes exceed the threshold of {}; heavy external \
                     interaction widens the attack surface.",
                    ops.external_calls(),
                    EXTERNAL_CALL_THRESHOLD
                ),
            ));
        }
        if ops.create2 > 0 {
            findings.push(Finding::new(
                EngineKind::Dynamic,
                "create2_opcode",
                Severity::Medium,
                "CREATE2 opcode present",
                "CREATE2 allows redeployment at a predictable address.",
            ));
        }
        if ops.create > 0 {
            findings.push(Finding::new(
                EngineKind::Dynamic,
                "create_opcode",
                Severity::Low,
                "CREATE opcode present",
                "The contract deploys child contracts at runtime.",
            ));
        }

        findings
    }

    fn state_findings(&self, ops: &OpcodeCounts) -> Vec<Finding> {
        let mut findings = Vec::new();
        if ops.total == 0 {
            return findings;
        }

        let read_density = ops.sload as f64 / ops.total as f64;
        let write_density = ops.sstore as f64 / ops.total as f64;

        if ops.sload >= STORAGE_MIN_COUNT && read_density > SLOAD_DENSITY_THRESHOLD {
            findings.push(Finding::new(
                EngineKind::Dynamic,
                "excessive_storage_reads",
                Severity::Medium,
                "excessive storage read density",
                format!(
                    "{} SLOAD bytes over {} positions ({:.1}% density).",
                    ops.sload,
                    ops.total,
                    read_density * 100.0
                ),
            ));
        }
        if ops.sstore >= STORAGE_MIN_COUNT && write_density > SSTORE_DENSITY_THRESHOLD {
            findings.push(Finding::new(
                EngineKind::Dynamic,
                "excessive_storage_writes",
                Severity::Medium,
                "excessive storage write density",
                format!(
                    "{} SSTORE bytes over {} positions ({:.1}% density).",
                    ops.sstore,
                    ops.total,
                    write_density * 100.0
                ),
            ));
        }

        findings
    }

    fn control_flow_findings(&self, ops: &OpcodeCounts) -> Vec<Finding> {
        let mut findings = Vec::new();

        if ops.approx_cyclomatic() > CYCLOMATIC_THRESHOLD {
            findings.push(Finding::new(
                EngineKind::Dynamic,
                "complex_control_flow",
                Severity::Medium,
                "high approximate cyclomatic complexity",
                format!(
                    "{} conditional jump bytes give an approximate cyclomatic \
                     complexity of {}, above the threshold of {}.",
                    ops.jumpi,
                    ops.approx_cyclomatic(),
                    CYCLOMATIC_THRESHOLD
                ),
            ));
        }

        findings
    }

    fn extract_selectors(&self, hex: &str) -> Vec<String> {
        let mut selectors = Vec::new();
        for caps in self.selector_re.captures_iter(hex) {
            let selector = format!("0x{}", &caps[1]);
            if !selectors.contains(&selector) {
                selectors.push(selector);
                if selectors.len() == MAX_SELECTORS {
                    break;
                }
            }
        }
        selectors
    }
}

impl Default for DynamicEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for DynamicEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Dynamic
    }

    fn applicable(&self, request: &ScanRequest) -> bool {
        request.has_bytecode()
    }

    fn analyze(&self, request: &ScanRequest) -> Result<EngineResult> {
        let Some(hex) = request.normalized_bytecode() else {
            bail!("dynamic engine requires bytecode");
        };

        let ops = OpcodeCounts::scan(&hex);

        let structural = self.structural_findings(&hex);
        let opcode = self.opcode_findings(&ops);
        let state = self.state_findings(&ops);
        let control_flow = self.control_flow_findings(&ops);

        let penalty = STRUCTURAL_PENALTY * structural.len() as u32
            + OPCODE_PENALTY * opcode.len() as u32
            + STATE_PENALTY * state.len() as u32
            + CONTROL_FLOW_PENALTY * control_flow.len() as u32;
        let score = 100u32.saturating_sub(penalty) as u8;

        let selectors = self.extract_selectors(&hex);
        let selector_count = selectors.len();
        let metrics = json!({
            "bytecodeBytes": hex.len() / 2,
            "hasConstructorPrologue": hex.starts_with("6080604052") || hex.starts_with("6060604052"),
            "opcodeCounts": {
                "call": ops.call,
                "callcode": ops.callcode,
                "delegatecall": ops.delegatecall,
                "selfdestruct": ops.selfdestruct,
                "create": ops.create,
                "create2": ops.create2,
                "sload": ops.sload,
                "sstore": ops.sstore,
                "jump": ops.jump,
                "jumpi": ops.jumpi,
            },
            "approxCyclomaticComplexity": ops.approx_cyclomatic(),
            "functionSelectors": selectors,
            "selectorCount": selector_count,
        });

        let mut findings = structural;
        findings.extend(opcode);
        findings.extend(state);
        findings.extend(control_flow);

        Ok(EngineResult::completed(
            EngineKind::Dynamic,
            score,
            findings,
            metrics,
        ))
    }
}

/// Byte-pair frequencies over the hex text. `total` is the number of
/// aligned pairs, which stands in for "instruction count" in the density
/// heuristics.
#[derive(Debug, Default)]
struct OpcodeCounts {
    total: usize,
    call: usize,
    callcode: usize,
    delegatecall: usize,
    selfdestruct: usize,
    create: usize,
    create2: usize,
    sload: usize,
    sstore: usize,
    jump: usize,
    jumpi: usize,
}

impl OpcodeCounts {
    fn scan(hex: &str) -> Self {
        let mut counts = Self::default();
        for pair in hex.as_bytes().chunks_exact(2) {
            counts.total += 1;
            match pair {
                b"f1" => counts.call += 1,
                b"f2" => counts.callcode += 1,
                b"f4" => counts.delegatecall += 1,
                b"ff" => counts.selfdestruct += 1,
                b"f0" => counts.create += 1,
                b"f5" => counts.create2 += 1,
                b"54" => counts.sload += 1,
                b"55" => counts.sstore += 1,
                b"56" => counts.jump += 1,
                b"57" => counts.jumpi += 1,
                _ => {}
            }
        }
        counts
    }

    fn external_calls(&self) -> usize {
        self.call + self.callcode
    }

    fn approx_cyclomatic(&self) -> usize {
        self.jumpi + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(bytecode: &str) -> EngineResult {
        let request = ScanRequest::new("0xabc", "hash").with_bytecode(bytecode);
        DynamicEngine::new().analyze(&request).unwrap()
    }

    #[test]
    fn empty_bytecode_scores_90_with_minimal_finding() {
        let result = analyze("");
        assert_eq!(result.score, 90);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].finding_type, "minimal_bytecode");
    }

    #[test]
    fn prefix_is_stripped_before_scanning() {
        let padding = "60".repeat(60);
        let result = analyze(&format!("0x{padding}"));
        assert!(result
            .findings
            .iter()
            .all(|f| f.finding_type != "minimal_bytecode"));
    }

    #[test]
    fn selfdestruct_and_delegatecall_bytes_are_flagged() {
        let body = format!("6080604052{}f4{}ff", "60".repeat(50), "60".repeat(50));
        let result = analyze(&body);
        let types: Vec<_> = result
            .findings
            .iter()
            .map(|f| f.finding_type.as_str())
            .collect();
        assert!(types.contains(&"selfdestruct_opcode"));
        assert!(types.contains(&"delegatecall_opcode"));
        assert_eq!(result.score, 70);
    }

    #[test]
    fn misaligned_opcode_bytes_are_not_counted() {
        // "0ff4" scanned as aligned pairs is [0f, f4]: one delegatecall,
        // no selfdestruct despite the "ff" substring straddling pairs.
        let body = format!("{}0ff4", "60".repeat(50));
        let result = analyze(&body);
        let types: Vec<_> = result
            .findings
            .iter()
            .map(|f| f.finding_type.as_str())
            .collect();
        assert!(types.contains(&"delegatecall_opcode"));
        assert!(!types.contains(&"selfdestruct_opcode"));
    }

    #[test]
    fn storage_read_density_above_threshold_is_flagged() {
        let result = analyze(&"54".repeat(60));
        assert!(result
            .findings
            .iter()
            .any(|f| f.finding_type == "excessive_storage_reads"));
        assert_eq!(result.score, 88);
    }

    #[test]
    fn selector_extraction_caps_at_ten_distinct() {
        let mut hex = "60".repeat(50);
        for i in 0..15u32 {
            hex.push_str(&format!("63{:08x}", 0xa0000000u32 + i));
        }
        // repeat the first selector; duplicates must not count twice
        hex.push_str("63a0000000");

        let result = analyze(&hex);
        let selectors = result.metrics["functionSelectors"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(selectors.len(), 10);
        assert_eq!(selectors[0], "0xa0000000");
    }

    #[test]
    fn heavy_branching_is_flagged_as_complex() {
        let body = format!("6080604052{}{}", "60".repeat(50), "57".repeat(25));
        let result = analyze(&body);
        assert!(result
            .findings
            .iter()
            .any(|f| f.finding_type == "complex_control_flow"));
    }

    #[test]
    fn score_never_leaves_range_on_hostile_input() {
        let nasty = format!("{}{}{}", "ff".repeat(30), "f4".repeat(30), "55".repeat(30));
        let result = analyze(&nasty);
        assert!(result.score <= 100);
    }

    #[test]
    fn proxy_marker_is_reported() {
        let body = format!("{}{}", MINIMAL_PROXY_MARKER, "60".repeat(60));
        let result = analyze(&body);
        assert!(result
            .findings
            .iter()
            .any(|f| f.finding_type == "proxy_pattern"));
    }
}
