use log::debug;
use ndarray::{ArrayD, IxDyn};
use ndarray_npy::write_npy;
use num::complex::Complex64;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use super::error::SimulationError;
use super::grid::GridSpec;
use crate::marginal::ProbabilityDensity;
use crate::wave_function::WaveFunction;

const MAGIC: &str = "WAVESIM";

/// What the scalar blocks of a grid file hold.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GridKind {
    /// Two floats per cell: real, imaginary
    Complex,
    /// |ψ| per cell
    Amplitude,
    /// A probability density per cell
    Density,
}

impl GridKind {
    pub fn components(self) -> usize {
        match self {
            GridKind::Complex => 2,
            GridKind::Amplitude | GridKind::Density => 1,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            GridKind::Complex => "complex",
            GridKind::Amplitude => "amplitude",
            GridKind::Density => "density",
        }
    }

    fn type_name(self) -> &'static str {
        match self.components() {
            2 => "float2",
            _ => "float",
        }
    }
}

impl FromStr for GridKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complex" => Ok(GridKind::Complex),
            "amplitude" => Ok(GridKind::Amplitude),
            "density" => Ok(GridKind::Density),
            other => Err(SimulationError::format(format!(
                "unsupported content kind `{other}`"
            ))),
        }
    }
}

/// One named block of per-cell floats.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarBlock {
    pub name: String,
    pub values: Vec<f32>,
}

/// In-memory form of a grid file.
///
/// ```text
/// WAVESIM <kind> <d>D <spacing>
/// DIMENSIONS <nx> <ny> [<nz>]
/// POINT_DATA <n>
/// SCALARS <name> <float|float2>
/// <n * components big-endian f32, x fastest>
/// ```
/// followed by any further `SCALARS` blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct GridFile {
    pub kind: GridKind,
    pub spec: GridSpec,
    pub spacing: f64,
    pub blocks: Vec<ScalarBlock>,
}

/// Big-endian bytes of `value`, through its bit pattern.
#[inline]
pub fn f32_to_be(value: f32) -> [u8; 4] {
    value.to_bits().to_be_bytes()
}

#[inline]
pub fn f32_from_be(bytes: [u8; 4]) -> f32 {
    f32::from_bits(u32::from_be_bytes(bytes))
}

impl GridFile {
    pub fn from_wave_function(wf: &WaveFunction, name: &str) -> Self {
        let values = wf
            .amplitudes()
            .iter()
            .flat_map(|a| [a.re as f32, a.im as f32])
            .collect();
        GridFile {
            kind: GridKind::Complex,
            spec: *wf.spec(),
            spacing: wf.spacing(),
            blocks: vec![ScalarBlock {
                name: name.to_string(),
                values,
            }],
        }
    }

    pub fn amplitude_of(wf: &WaveFunction, name: &str) -> Self {
        GridFile {
            kind: GridKind::Amplitude,
            spec: *wf.spec(),
            spacing: wf.spacing(),
            blocks: vec![ScalarBlock {
                name: name.to_string(),
                values: wf.amplitudes().iter().map(|a| a.norm() as f32).collect(),
            }],
        }
    }

    /// One density block per entry; every density must share a grid.
    pub fn from_densities(densities: &[(&str, &ProbabilityDensity)]) -> Result<Self, SimulationError> {
        let (_, first) = densities
            .first()
            .ok_or_else(|| SimulationError::invalid("no densities to write"))?;
        let spec = *first.spec();
        let blocks = densities
            .iter()
            .map(|(name, density)| {
                if density.spec() != &spec {
                    return Err(SimulationError::invalid(format!(
                        "density `{name}` is on {:?}, expected {:?}",
                        density.spec().shape(),
                        spec.shape()
                    )));
                }
                Ok(ScalarBlock {
                    name: name.to_string(),
                    values: density.values().iter().map(|&v| v as f32).collect(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GridFile {
            kind: GridKind::Density,
            spec,
            spacing: first.spacing(),
            blocks,
        })
    }

    pub fn block(&self, name: &str) -> Option<&ScalarBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Rebuilds the wavefunction stored in the first block of a complex file.
    pub fn to_wave_function(&self) -> Result<WaveFunction, SimulationError> {
        if self.kind != GridKind::Complex {
            return Err(SimulationError::invalid(format!(
                "a {} grid file holds no phase",
                self.kind.tag()
            )));
        }
        let block = self
            .blocks
            .first()
            .ok_or_else(|| SimulationError::format("file has no scalar blocks"))?;
        let amplitudes = block
            .values
            .chunks_exact(2)
            .map(|c| Complex64::new(c[0] as f64, c[1] as f64))
            .collect();
        WaveFunction::new(self.spec, self.spacing, amplitudes)
    }

    /// Every block must have one value per cell and component, and a
    /// single-word name.
    pub fn check_blocks(&self) -> Result<(), SimulationError> {
        let expected = self.spec.len() * self.kind.components();
        for block in &self.blocks {
            if block.values.len() != expected {
                return Err(SimulationError::invalid(format!(
                    "block `{}` has {} values, expected {expected}",
                    block.name,
                    block.values.len()
                )));
            }
            if block.name.is_empty() || block.name.contains(char::is_whitespace) {
                return Err(SimulationError::invalid(format!(
                    "block name `{}` must be a single word",
                    block.name
                )));
            }
        }
        Ok(())
    }

    /// Nothing is written unless every block passes [`Self::check_blocks`].
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), SimulationError> {
        self.check_blocks()?;
        let expected = self.spec.len() * self.kind.components();
        let shape = self.spec.shape();

        writeln!(
            writer,
            "{MAGIC} {} {}D {}",
            self.kind.tag(),
            shape.len(),
            self.spacing
        )?;
        let dims: Vec<String> = shape.iter().map(usize::to_string).collect();
        writeln!(writer, "DIMENSIONS {}", dims.join(" "))?;
        writeln!(writer, "POINT_DATA {}", self.spec.len())?;

        for block in &self.blocks {
            writeln!(writer, "SCALARS {} {}", block.name, self.kind.type_name())?;
            let mut bytes = Vec::with_capacity(4 * expected);
            for &v in &block.values {
                bytes.extend_from_slice(&f32_to_be(v));
            }
            writer.write_all(&bytes)?;
            writeln!(writer)?;
        }
        Ok(())
    }

    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Self, SimulationError> {
        let tag = read_header_line(reader, "format tag")?;
        let mut fields = tag.split_whitespace();
        if fields.next() != Some(MAGIC) {
            return Err(SimulationError::format(format!("missing `{MAGIC}` tag")));
        }
        let kind: GridKind = fields
            .next()
            .ok_or_else(|| SimulationError::format("missing content kind"))?
            .parse()?;
        let dims: usize = fields
            .next()
            .and_then(|d| d.strip_suffix('D'))
            .and_then(|d| d.parse().ok())
            .ok_or_else(|| SimulationError::format("missing dimensionality"))?;
        let spacing: f64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| SimulationError::format("missing lattice spacing"))?;

        let line = read_header_line(reader, "DIMENSIONS")?;
        let sizes = line
            .strip_prefix("DIMENSIONS")
            .ok_or_else(|| SimulationError::format(format!("expected DIMENSIONS, found `{line}`")))?
            .split_whitespace()
            .map(|s| {
                s.parse::<usize>()
                    .map_err(|_| SimulationError::format(format!("unparseable dimension `{s}`")))
            })
            .collect::<Result<Vec<usize>, _>>()?;
        if sizes.len() != dims {
            return Err(SimulationError::format(format!(
                "tag says {dims}D but DIMENSIONS lists {} sizes",
                sizes.len()
            )));
        }
        let spec = GridSpec::new(&sizes).map_err(|e| SimulationError::format(e.to_string()))?;

        let line = read_header_line(reader, "POINT_DATA")?;
        let points: usize = line
            .strip_prefix("POINT_DATA")
            .and_then(|p| p.trim().parse().ok())
            .ok_or_else(|| SimulationError::format(format!("expected POINT_DATA, found `{line}`")))?;
        if points != spec.len() {
            return Err(SimulationError::format(format!(
                "POINT_DATA {points} does not match dimensions {sizes:?}"
            )));
        }

        let count = points * kind.components();
        let mut blocks = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut fields = trimmed.split_whitespace();
            let (Some("SCALARS"), Some(name), Some(ty)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(SimulationError::format(format!(
                    "expected SCALARS line, found `{trimmed}`"
                )));
            };
            if ty != kind.type_name() {
                return Err(SimulationError::format(format!(
                    "block `{name}` is `{ty}` in a {} file",
                    kind.tag()
                )));
            }
            let name = name.to_string();

            let mut bytes = vec![0u8; 4 * count];
            reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => {
                    SimulationError::format(format!("payload of `{name}` is truncated"))
                }
                _ => SimulationError::Io(e),
            })?;
            let values = bytes
                .chunks_exact(4)
                .map(|c| f32_from_be([c[0], c[1], c[2], c[3]]))
                .collect();
            blocks.push(ScalarBlock { name, values });

            // Newline that terminates the payload
            let mut terminator = [0u8; 1];
            if reader.read(&mut terminator)? == 1 && terminator[0] != b'\n' {
                return Err(SimulationError::format("payload is longer than POINT_DATA"));
            }
        }
        if blocks.is_empty() {
            return Err(SimulationError::format("file has no scalar blocks"));
        }

        Ok(GridFile {
            kind,
            spec,
            spacing,
            blocks,
        })
    }

    pub fn write_path<P: AsRef<Path>>(&self, path: P) -> Result<(), SimulationError> {
        self.check_blocks()?;
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        debug!("Wrote {}", path.as_ref().display());
        Ok(())
    }

    pub fn read_path<P: AsRef<Path>>(path: P) -> Result<Self, SimulationError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader)
    }
}

fn read_header_line<R: BufRead>(reader: &mut R, what: &str) -> Result<String, SimulationError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(SimulationError::format(format!("file ends before {what} line")));
    }
    Ok(line.trim().to_string())
}

/// Writes a density grid to `.npy`, shaped (nz, ny, nx) or (ny, nx) so the
/// x axis stays contiguous.
pub fn density_to_npy<P: AsRef<Path>>(
    path: P,
    spec: &GridSpec,
    values: &[f64],
) -> Result<(), SimulationError> {
    spec.check_len(values.len(), "density")?;
    let shape: Vec<usize> = spec.shape().iter().rev().copied().collect();
    let array = ArrayD::from_shape_vec(IxDyn(&shape), values.to_vec())
        .map_err(|e| SimulationError::invalid(e.to_string()))?;
    write_npy(path, &array)?;
    Ok(())
}

#[test]
fn test_big_endian_bytes() {
    assert_eq!(f32_to_be(1.0), [0x3f, 0x80, 0x00, 0x00]);
    assert_eq!(f32_from_be([0xc0, 0x00, 0x00, 0x00]), -2.0);
    let subnormal = f32::from_bits(0x0000_0001);
    assert_eq!(f32_to_be(subnormal), [0, 0, 0, 1]);
    assert_eq!(f32_from_be(f32_to_be(subnormal)).to_bits(), 1);
}

#[test]
fn test_bad_tag_is_a_format_error() {
    let text = b"VTK complex 2D 1\nDIMENSIONS 2 2\nPOINT_DATA 4\n";
    let result = GridFile::read_from(&mut &text[..]);
    assert!(matches!(result, Err(SimulationError::Format(_))));

    let text = b"WAVESIM phase 2D 1\nDIMENSIONS 2 2\nPOINT_DATA 4\n";
    let result = GridFile::read_from(&mut &text[..]);
    assert!(matches!(result, Err(SimulationError::Format(_))));

    let text = b"WAVESIM density 2D 1\nDIMENSIONS 2 x\nPOINT_DATA 4\n";
    let result = GridFile::read_from(&mut &text[..]);
    assert!(matches!(result, Err(SimulationError::Format(_))));
}

#[test]
fn test_truncated_payload_is_a_format_error() {
    let spec = GridSpec::new(&[2, 2]).unwrap();
    let density = ProbabilityDensity::new(spec, 1.0, vec![0.25; 4]).unwrap();
    let file = GridFile::from_densities(&[("p", &density)]).unwrap();
    let mut bytes = Vec::new();
    file.write_to(&mut bytes).unwrap();
    bytes.truncate(bytes.len() - 6);
    let result = GridFile::read_from(&mut &bytes[..]);
    assert!(matches!(result, Err(SimulationError::Format(_))));
}

#[test]
fn test_header_layout() {
    let spec = GridSpec::new(&[3, 2, 2]).unwrap();
    let density = ProbabilityDensity::new(spec, 0.5, vec![1.0; 12]).unwrap();
    let file = GridFile::from_densities(&[("particle1", &density), ("particle2", &density)]).unwrap();
    let mut bytes = Vec::new();
    file.write_to(&mut bytes).unwrap();
    let header = b"WAVESIM density 3D 0.5\nDIMENSIONS 3 2 2\nPOINT_DATA 12\nSCALARS particle1 float\n";
    assert_eq!(&bytes[..header.len()], &header[..]);
    assert_eq!(bytes.len(), header.len() + 48 + 1 + "SCALARS particle2 float\n".len() + 48 + 1);
}

#[test]
fn test_bad_block_writes_nothing() {
    let spec = GridSpec::new(&[2, 2]).unwrap();
    let file = GridFile {
        kind: GridKind::Density,
        spec,
        spacing: 1.0,
        blocks: vec![
            ScalarBlock {
                name: "good".to_string(),
                values: vec![0.25; 4],
            },
            ScalarBlock {
                name: "short".to_string(),
                values: vec![0.25; 3],
            },
        ],
    };
    let mut bytes = Vec::new();
    assert!(matches!(
        file.write_to(&mut bytes),
        Err(SimulationError::InvalidArgument(_))
    ));
    assert!(bytes.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.wsg");
    assert!(file.write_path(&path).is_err());
    assert!(!path.exists());
}
