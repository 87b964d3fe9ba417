//! Helpers for the run-oriented front ends: suffixed integers and the
//! argument list handed to a compiled instrument binary.

use std::fmt;

use indexmap::IndexMap;

/// Runtime options forwarded to a compiled McCode binary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeArgs {
    pub seed: Option<i64>,
    pub ncount: Option<u64>,
    pub dir: Option<String>,
    pub trace: bool,
    pub gravitation: bool,
    pub bufsiz: Option<u64>,
    pub format: Option<String>,
}

impl RuntimeArgs {
    /// The standardized `--flag=value` list, in canonical order.
    pub fn to_arg_list(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(seed) = self.seed {
            out.push(format!("--seed={seed}"));
        }
        if let Some(ncount) = self.ncount {
            out.push(format!("--ncount={ncount}"));
        }
        if let Some(dir) = &self.dir {
            out.push(format!("--dir={dir}"));
        }
        if self.trace {
            out.push("--trace".to_string());
        }
        if self.gravitation {
            out.push("--gravitation".to_string());
        }
        if let Some(bufsiz) = self.bufsiz {
            out.push(format!("--bufsiz={bufsiz}"));
        }
        if let Some(format) = &self.format {
            out.push(format!("--format={format}"));
        }
        out
    }

    /// Options followed by `name=value` instrument parameters.
    pub fn command_line(&self, parameters: &IndexMap<String, String>) -> String {
        let mut parts = self.to_arg_list();
        parts.extend(parameters.iter().map(|(k, v)| format!("{k}={v}")));
        parts.join(" ")
    }
}

/// Error from [`si_int`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiIntError(String);

impl fmt::Display for SiIntError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid suffixed integer: {}", self.0)
    }
}

impl std::error::Error for SiIntError {}

/// Parse an integer with an optional SI (`k`/`M`/`G`/`T`/`P`) or binary
/// (`Ki`/`Mi`/`Gi`/`Ti`/`Pi`) suffix, e.g. `1M` or `2Gi`. Fractional
/// mantissas are allowed (`2.5M`).
pub fn si_int(text: &str) -> Result<i64, SiIntError> {
    const SUFFIXES: [(&str, i64); 10] = [
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("Pi", 1 << 50),
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
        ("P", 1_000_000_000_000_000),
    ];
    let text = text.trim();
    let (mantissa, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, multiplier)| {
            text.strip_suffix(suffix).map(|rest| (rest.trim(), *multiplier))
        })
        .unwrap_or((text, 1));
    let value = if let Ok(int) = mantissa.parse::<i64>() {
        int.checked_mul(multiplier)
            .ok_or_else(|| SiIntError(text.to_string()))?
    } else {
        let float: f64 = mantissa.parse().map_err(|_| SiIntError(text.to_string()))?;
        (float * multiplier as f64) as i64
    };
    if value < 0 {
        tracing::info!(input = text, "negative count encountered");
    } else if value > (1_i64 << 53) {
        tracing::info!(
            input = text,
            value,
            "counts above 2^53 are parsed as doubles by the runtime and lose precision"
        );
    }
    Ok(value)
}
