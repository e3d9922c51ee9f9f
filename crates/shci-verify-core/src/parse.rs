use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Orbital-index quadruple addressing one spatial 2-RDM entry.
pub type RdmIndex = [usize; 4];

/// Parsed spatial two-particle reduced density matrix. Entries keep their
/// exact index association; comparison is per-indexed-entry downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialRdm {
    dimension: usize,
    entries: BTreeMap<RdmIndex, f64>,
}

impl SpatialRdm {
    pub fn new(dimension: usize, entries: BTreeMap<RdmIndex, f64>) -> Self {
        Self { dimension, entries }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: RdmIndex) -> Option<f64> {
        self.entries.get(&index).copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (RdmIndex, f64)> + '_ {
        self.entries.iter().map(|(index, value)| (*index, *value))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("expected output artifact '{path}' was not produced")]
    MissingArtifact { path: PathBuf },
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("'{path}' does not contain field '{field}'")]
    MissingField { path: PathBuf, field: &'static str },
    #[error("'{path}' line {line}: token '{token}' is not a valid number")]
    MalformedValue {
        path: PathBuf,
        line: usize,
        token: String,
    },
    #[error("'{path}' line {line}: expected 'i j k l value', found {found} token(s)")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        found: usize,
    },
    #[error("'{path}' line {line}: orbital index {index} exceeds dimension {dimension}")]
    IndexOutOfRange {
        path: PathBuf,
        line: usize,
        index: usize,
        dimension: usize,
    },
    #[error("'{path}' line {line}: duplicate entry for index ({i},{j},{k},{l})")]
    DuplicateIndex {
        path: PathBuf,
        line: usize,
        i: usize,
        j: usize,
        k: usize,
        l: usize,
    },
}

/// Reads the ground-state energy the engine wrote into the workspace.
pub fn parse_energy(workspace: &Path) -> Result<f64, ParseError> {
    parse_energy_file(&workspace.join(crate::domain::QuantityKind::Energy.output_artifact()))
}

/// Reads an energy file: whitespace-separated floats, first value is the
/// ground-state energy. Blank lines and extra whitespace are tolerated.
pub fn parse_energy_file(path: &Path) -> Result<f64, ParseError> {
    let content = read_artifact(path)?;

    for (line_index, line) in content.lines().enumerate() {
        for token in line.split_whitespace() {
            let value = parse_float(token).ok_or_else(|| ParseError::MalformedValue {
                path: path.to_path_buf(),
                line: line_index + 1,
                token: token.to_string(),
            })?;
            return Ok(value);
        }
    }

    Err(ParseError::MissingField {
        path: path.to_path_buf(),
        field: "ground-state energy",
    })
}

/// Reads the spatial 2-RDM the engine wrote into the workspace.
pub fn parse_rdm(workspace: &Path) -> Result<SpatialRdm, ParseError> {
    parse_rdm_file(&workspace.join(crate::domain::QuantityKind::SpatialRdm.output_artifact()))
}

/// Reads a spatial 2-RDM file: a header line holding the orbital dimension
/// `n`, then `i j k l value` rows with all indices `< n`. Index-to-value
/// association is preserved exactly; an out-of-range or duplicate index is
/// a parse error, never a silent numeric mismatch.
pub fn parse_rdm_file(path: &Path) -> Result<SpatialRdm, ParseError> {
    let content = read_artifact(path)?;
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (header_index, header) = lines.next().ok_or_else(|| ParseError::MissingField {
        path: path.to_path_buf(),
        field: "orbital dimension header",
    })?;
    let dimension = header
        .trim()
        .parse::<usize>()
        .map_err(|_| ParseError::MalformedValue {
            path: path.to_path_buf(),
            line: header_index + 1,
            token: header.trim().to_string(),
        })?;

    let mut entries = BTreeMap::new();
    for (line_index, line) in lines {
        let tokens = line.split_whitespace().collect::<Vec<_>>();
        if tokens.len() != 5 {
            return Err(ParseError::MalformedRow {
                path: path.to_path_buf(),
                line: line_index + 1,
                found: tokens.len(),
            });
        }

        let mut index = [0usize; 4];
        for (slot, token) in index.iter_mut().zip(&tokens[..4]) {
            *slot = token.parse::<usize>().map_err(|_| ParseError::MalformedValue {
                path: path.to_path_buf(),
                line: line_index + 1,
                token: token.to_string(),
            })?;
            if *slot >= dimension {
                return Err(ParseError::IndexOutOfRange {
                    path: path.to_path_buf(),
                    line: line_index + 1,
                    index: *slot,
                    dimension,
                });
            }
        }

        let value = parse_float(tokens[4]).ok_or_else(|| ParseError::MalformedValue {
            path: path.to_path_buf(),
            line: line_index + 1,
            token: tokens[4].to_string(),
        })?;

        if entries.insert(index, value).is_some() {
            return Err(ParseError::DuplicateIndex {
                path: path.to_path_buf(),
                line: line_index + 1,
                i: index[0],
                j: index[1],
                k: index[2],
                l: index[3],
            });
        }
    }

    Ok(SpatialRdm::new(dimension, entries))
}

fn read_artifact(path: &Path) -> Result<String, ParseError> {
    if !path.is_file() {
        return Err(ParseError::MissingArtifact {
            path: path.to_path_buf(),
        });
    }
    fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })
}

// Fortran-style D exponents show up in engine output on some builds.
fn parse_float(token: &str) -> Option<f64> {
    let normalized = token.replace(['D', 'd'], "E");
    normalized.parse::<f64>().ok()
}
