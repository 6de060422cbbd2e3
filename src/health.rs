use color_eyre::eyre::{eyre, Result};
use std::process::Command;
use std::time::Instant;

struct QualityGate {
    label: &'static str,
    program: &'static str,
    args: &'static [&'static str],
}

// Fixed gate sequence; clippy's dead_code/unused lints double as the
// dead-export scan.
const GATES: &[QualityGate] = &[
    QualityGate {
        label: "format",
        program: "cargo",
        args: &["fmt", "--all", "--", "--check"],
    },
    QualityGate {
        label: "lint",
        program: "cargo",
        args: &["clippy", "--all-targets", "--", "-D", "warnings"],
    },
    QualityGate {
        label: "typecheck",
        program: "cargo",
        args: &["check", "--all-targets"],
    },
    QualityGate {
        label: "build",
        program: "cargo",
        args: &["build"],
    },
    QualityGate {
        label: "test",
        program: "cargo",
        args: &["test"],
    },
];

/// Runs every quality gate in order, printing one pass/fail line per check.
/// The process exits nonzero when any gate fails.
pub fn run() -> Result<()> {
    let mut failures = 0usize;
    for gate in GATES {
        let started = Instant::now();
        let outcome = run_gate(gate);
        let elapsed = started.elapsed().as_secs_f64();
        match outcome {
            Ok(true) => println!("PASS {} ({elapsed:.1}s)", gate.label),
            Ok(false) => {
                failures += 1;
                println!("FAIL {} ({elapsed:.1}s)", gate.label);
            }
            Err(err) => {
                failures += 1;
                println!("FAIL {} ({elapsed:.1}s): {err}", gate.label);
            }
        }
    }
    if failures > 0 {
        return Err(eyre!("{failures} of {} checks failed", GATES.len()));
    }
    println!("All {} checks passed", GATES.len());
    Ok(())
}

fn run_gate(gate: &QualityGate) -> Result<bool> {
    let status = Command::new(gate.program).args(gate.args).status()?;
    Ok(status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_exit_status_maps_to_pass_fail() {
        let ok = QualityGate {
            label: "ok",
            program: "true",
            args: &[],
        };
        let bad = QualityGate {
            label: "bad",
            program: "false",
            args: &[],
        };
        assert!(run_gate(&ok).unwrap());
        assert!(!run_gate(&bad).unwrap());
    }

    #[test]
    fn missing_program_is_an_error_not_a_pass() {
        let gate = QualityGate {
            label: "ghost",
            program: "no-such-quality-gate-binary",
            args: &[],
        };
        assert!(run_gate(&gate).is_err());
    }
}
