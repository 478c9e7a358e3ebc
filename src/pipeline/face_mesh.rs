//! Face mesh tesselation, derived from the triangle list of the canonical face
//! model. Every triangle edge becomes one connector.

use std::{collections::BTreeSet, fs, path::Path};

use thiserror::Error;

use super::skeleton::Connection;

/// Vertex count of the face mesh the tesselation must fit.
pub const FACE_MESH_VERTICES: usize = 468;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to read face topology {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: malformed face record {record:?}")]
    Malformed { line: usize, record: String },
    #[error("line {line}: vertex index {index} outside the {limit}-vertex mesh")]
    OutOfRange {
        line: usize,
        index: usize,
        limit: usize,
    },
    #[error("face topology contains no triangles")]
    Empty,
}

#[derive(Clone, Debug, Default)]
pub struct FaceMesh {
    tesselation: Vec<Connection>,
}

impl FaceMesh {
    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let text = fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let tesselation = parse_obj_edges(&text, FACE_MESH_VERTICES)?;
        log::info!(
            "loaded face tesselation with {} edges from {}",
            tesselation.len(),
            path.display()
        );
        Ok(Self::from_edges(tesselation))
    }

    pub fn tesselation(&self) -> &[Connection] {
        &self.tesselation
    }

    pub fn from_edges(tesselation: Vec<Connection>) -> Self {
        Self { tesselation }
    }
}

/// Collects the unique edges of every `f` record in a Wavefront OBJ file.
/// Indices are 1-based in the file and may carry `/vt/vn` suffixes.
pub fn parse_obj_edges(text: &str, limit: usize) -> Result<Vec<Connection>, TopologyError> {
    let mut edges = BTreeSet::new();

    for (line_no, line) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let mut fields = line.split_whitespace();
        if fields.next() != Some("f") {
            continue;
        }

        let mut vertices = Vec::with_capacity(3);
        for field in fields {
            let index = field
                .split('/')
                .next()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&v| v > 0)
                .ok_or_else(|| TopologyError::Malformed {
                    line: line_no,
                    record: line.to_string(),
                })?
                - 1;
            if index >= limit {
                return Err(TopologyError::OutOfRange {
                    line: line_no,
                    index,
                    limit,
                });
            }
            vertices.push(index);
        }
        if vertices.len() < 3 {
            return Err(TopologyError::Malformed {
                line: line_no,
                record: line.to_string(),
            });
        }

        for (i, &a) in vertices.iter().enumerate() {
            let b = vertices[(i + 1) % vertices.len()];
            edges.insert((a.min(b), a.max(b)));
        }
    }

    if edges.is_empty() {
        return Err(TopologyError::Empty);
    }
    Ok(edges.into_iter().collect())
}
