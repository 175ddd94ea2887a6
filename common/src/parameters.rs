use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::sync::OnceLock;

use crate::{
    error::CommonError,
    ics::{DampingParameters, PotentialParameters, WavePacket},
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunParameters {
    /// Number of grid cells along each axis (2 or 3 entries)
    pub size: Vec<usize>,
    /// Lattice spacing, identical along every axis
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    /// One mass for a single particle run, two for a two-particle run
    pub masses: Vec<f64>,
    /// Initial wavepacket of each particle
    pub packets: Vec<WavePacket>,
    /// Static potential
    #[serde(default)]
    pub potential: PotentialParameters,
    /// Absorbing border
    pub damping: Option<DampingParameters>,
    /// Time step
    pub dt: f64,
    /// Total simulated time
    pub total_time: f64,
    /// Number of keyframes, uniformly spaced in time
    #[serde(default = "default_frames")]
    pub frames: u32,
    /// Whether grid updates fan out over the rayon pool
    #[serde(default = "default_multithreaded")]
    pub multithreaded: bool,
    /// Name of run (used for output file names)
    #[serde(default = "default_sim_name")]
    pub sim_name: String,
    /// Directory that keyframes are written into
    pub output_dir: Option<String>,
    /// Flag indicating whether keyframe densities are also written as .npy
    #[serde(default = "bool::default")]
    pub output_npy: bool,
}

fn default_spacing() -> f64 {
    1.0
}

fn default_frames() -> u32 {
    2
}

fn default_multithreaded() -> bool {
    true
}

fn default_sim_name() -> String {
    "wavesim".to_string()
}

impl RunParameters {
    pub fn dims(&self) -> usize {
        self.size.len()
    }

    pub fn is_two_particle(&self) -> bool {
        self.masses.len() == 2
    }

    /// Checks everything the simulator relies on without re-checking.
    pub fn validate(&self) -> Result<(), CommonError> {
        let dims = self.dims();
        if !(2..=3).contains(&dims) {
            return Err(CommonError::invalid(
                "size",
                format!("expected 2 or 3 axes, found {dims}"),
            ));
        }
        if self.size.iter().any(|&n| n == 0) {
            return Err(CommonError::invalid("size", "every axis needs at least one cell"));
        }
        check_positive("spacing", self.spacing)?;
        check_positive("dt", self.dt)?;
        check_positive("total_time", self.total_time)?;

        if !(1..=2).contains(&self.masses.len()) {
            return Err(CommonError::invalid(
                "masses",
                format!("expected 1 or 2 masses, found {}", self.masses.len()),
            ));
        }
        for &mass in &self.masses {
            check_positive("masses", mass)?;
        }
        if self.packets.len() != self.masses.len() {
            return Err(CommonError::invalid(
                "packets",
                format!(
                    "{} packets given for {} particles",
                    self.packets.len(),
                    self.masses.len()
                ),
            ));
        }
        for packet in &self.packets {
            check_len("center", &packet.center, dims)?;
            check_len("width", &packet.width, dims)?;
            check_len("momentum", &packet.momentum, dims)?;
            for &w in &packet.width {
                check_positive("width", w)?;
            }
        }

        if let PotentialParameters::SoftCoulomb { softening, .. } = &self.potential {
            check_positive("potential.softening", *softening)?;
        }
        if let PotentialParameters::Harmonic {
            center: Some(center),
            ..
        }
        | PotentialParameters::SoftCoulomb {
            center: Some(center),
            ..
        } = &self.potential
        {
            check_len("potential.center", center, dims)?;
        }

        if let Some(damping) = self.damping {
            if damping.factor < 0.0 || !damping.factor.is_finite() {
                return Err(CommonError::invalid(
                    "damping.factor",
                    format!("must be a non-negative number, found {}", damping.factor),
                ));
            }
            let smallest = self.size.iter().copied().min().unwrap_or(0);
            if 2 * damping.width > smallest {
                return Err(CommonError::invalid(
                    "damping.width",
                    format!("{} layers do not fit in an axis of {smallest} cells", damping.width),
                ));
            }
        }
        Ok(())
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), CommonError> {
    (value > 0.0 && value.is_finite())
        .then_some(())
        .ok_or_else(|| CommonError::invalid(name, format!("must be positive, found {value}")))
}

fn check_len(name: &'static str, values: &[f64], dims: usize) -> Result<(), CommonError> {
    (values.len() == dims).then_some(()).ok_or_else(|| {
        CommonError::invalid(
            name,
            format!("expected {dims} components, found {}", values.len()),
        )
    })
}

impl Display for RunParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", "-".repeat(40))?;
        writeln!(f, "size           = {:?}", self.size)?;
        writeln!(f, "spacing        = {}", self.spacing)?;
        writeln!(f, "masses         = {:?}", self.masses)?;
        for (i, packet) in self.packets.iter().enumerate() {
            writeln!(
                f,
                "packet {}       = center {:?}, width {:?}, momentum {:?}",
                i + 1,
                packet.center,
                packet.width,
                packet.momentum
            )?;
        }
        writeln!(f, "potential      = {:?}", self.potential)?;
        match self.damping {
            Some(d) => writeln!(f, "damping        = {} layers, factor {}", d.width, d.factor)?,
            None => writeln!(f, "damping        = none")?,
        }
        writeln!(f, "dt             = {}", self.dt)?;
        writeln!(f, "total_time     = {}", self.total_time)?;
        writeln!(f, "frames         = {}", self.frames)?;
        writeln!(f, "multithreaded  = {}", self.multithreaded)?;
        writeln!(f, "sim_name       = {}", self.sim_name)?;
        writeln!(f, "{}", "-".repeat(40))?;
        Ok(())
    }
}

/// This function reads toml files
pub fn read_toml(path: &str) -> Result<RunParameters, CommonError> {
    // Read toml config file
    let toml_contents: &str =
        &std::fs::read_to_string(path).map_err(|_| CommonError::TomlReadError {
            path: path.to_string(),
        })?;

    // Return parsed toml from str
    let parameters: RunParameters =
        toml::from_str(toml_contents).map_err(|e| CommonError::TomlParseError {
            msg: format!("{e}"),
        })?;
    parameters.validate()?;
    Ok(parameters)
}

/// Reads a parameter file, choosing the parser by extension:
/// `.toml` files are toml, anything else is the `Key: value` text format.
pub fn read_run_parameters(path: &str) -> Result<RunParameters, CommonError> {
    let is_toml = Path::new(path)
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        return read_toml(path);
    }
    let contents = std::fs::read_to_string(path).map_err(|_| CommonError::TomlReadError {
        path: path.to_string(),
    })?;
    parse_run_text(&contents)
}

type CompiledPattern = OnceLock<Result<Regex, regex::Error>>;

fn compiled(cell: &'static CompiledPattern, pattern: &str) -> Result<&'static Regex, CommonError> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| CommonError::PatternError(e.to_string()))
}

fn line_regex() -> Result<&'static Regex, CommonError> {
    static LINE: CompiledPattern = OnceLock::new();
    compiled(&LINE, r"^\s*([A-Za-z][A-Za-z0-9 ]*?)\s*:\s*(.*?)\s*$")
}

fn assignment_regex() -> Result<&'static Regex, CommonError> {
    static ASSIGNMENT: CompiledPattern = OnceLock::new();
    compiled(&ASSIGNMENT, r"([A-Za-z_]+)\s*=\s*([^\s=]+)")
}

const KNOWN_KEYS: [&str; 19] = [
    "grid size",
    "spacing",
    "mass",
    "mass 2",
    "center",
    "width",
    "momentum",
    "center 2",
    "width 2",
    "momentum 2",
    "damping width",
    "damping factor",
    "time step",
    "total time",
    "frames",
    "multithreaded",
    "name",
    "output",
    "potential",
];

/// Parses the line-oriented `Key: value` run description.
///
/// Blank lines and lines starting with `#` are ignored. Keys are matched
/// case-insensitively with runs of whitespace collapsed. Vectors are
/// separated by commas and/or whitespace, optionally wrapped in brackets.
/// The potential is a name followed by `field=value` pairs, e.g.
/// `Potential: Harmonic omega=0.5 center=16,16`.
pub fn parse_run_text(text: &str) -> Result<RunParameters, CommonError> {
    let mut entries: HashMap<String, (usize, &str)> = HashMap::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let captures = line_regex()?
            .captures(trimmed)
            .ok_or_else(|| CommonError::TextParseError {
                line,
                msg: format!("expected `Key: value`, found `{trimmed}`"),
            })?;
        let key = captures[1]
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if !KNOWN_KEYS.contains(&key.as_str()) {
            return Err(CommonError::TextParseError {
                line,
                msg: format!("unknown key `{key}`"),
            });
        }
        let value = captures.get(2).map_or("", |m| m.as_str());
        if entries.insert(key.clone(), (line, value)).is_some() {
            return Err(CommonError::TextParseError {
                line,
                msg: format!("duplicate key `{key}`"),
            });
        }
    }

    let entries = TextEntries { entries };

    let size: Vec<usize> = entries.required("grid size", parse_sizes)?;
    let dims = size.len();
    let spacing = entries.optional("spacing", parse_scalar)?.unwrap_or(1.0);
    let dt = entries.required("time step", parse_scalar)?;
    let total_time = entries.required("total time", parse_scalar)?;
    let frames = entries
        .optional("frames", |v| {
            v.parse::<u32>()
                .map_err(|e| format!("`{v}` is not a frame count: {e}"))
        })?
        .unwrap_or_else(default_frames);
    let multithreaded = entries
        .optional("multithreaded", parse_flag)?
        .unwrap_or(true);
    let sim_name = entries
        .optional("name", |v| Ok(v.to_string()))?
        .unwrap_or_else(default_sim_name);
    let output_dir = entries.optional("output", |v| Ok(v.to_string()))?;
    let potential = entries
        .optional("potential", parse_potential)?
        .unwrap_or_default();

    let mut masses = vec![entries.optional("mass", parse_scalar)?.unwrap_or(1.0)];
    let mut packets = vec![entries.packet("", dims)?.ok_or(CommonError::TextParseError {
        line: 0,
        msg: "missing key `center`".to_string(),
    })?];
    let second_packet = entries.packet(" 2", dims)?;
    match (entries.optional("mass 2", parse_scalar)?, second_packet) {
        (Some(mass), Some(packet)) => {
            masses.push(mass);
            packets.push(packet);
        }
        (None, None) => {}
        (Some(_), None) => {
            return Err(CommonError::TextParseError {
                line: entries.line_of("mass 2"),
                msg: "`Mass 2` given without `Center 2`".to_string(),
            })
        }
        (None, Some(_)) => {
            return Err(CommonError::TextParseError {
                line: entries.line_of("center 2"),
                msg: "`Center 2` given without `Mass 2`".to_string(),
            })
        }
    }

    let damping_width = entries.optional("damping width", |v| {
        v.parse::<usize>()
            .map_err(|e| format!("`{v}` is not a layer count: {e}"))
    })?;
    let damping_factor = entries.optional("damping factor", parse_scalar)?;
    let damping = match (damping_width, damping_factor) {
        (Some(width), Some(factor)) if width > 0 && factor > 0.0 => {
            Some(DampingParameters { width, factor })
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(CommonError::invalid(
                "damping",
                "`Damping Width` and `Damping Factor` must be given together",
            ))
        }
        _ => None,
    };

    let parameters = RunParameters {
        size,
        spacing,
        masses,
        packets,
        potential,
        damping,
        dt,
        total_time,
        frames,
        multithreaded,
        sim_name,
        output_dir,
        output_npy: false,
    };
    parameters.validate()?;
    Ok(parameters)
}

struct TextEntries<'a> {
    entries: HashMap<String, (usize, &'a str)>,
}

impl<'a> TextEntries<'a> {
    fn line_of(&self, key: &str) -> usize {
        self.entries.get(key).map_or(0, |&(line, _)| line)
    }

    fn optional<T, F>(&self, key: &str, parse: F) -> Result<Option<T>, CommonError>
    where
        F: Fn(&str) -> Result<T, String>,
    {
        match self.entries.get(key) {
            Some(&(line, value)) => parse(value)
                .map(Some)
                .map_err(|msg| CommonError::TextParseError { line, msg }),
            None => Ok(None),
        }
    }

    fn required<T, F>(&self, key: &str, parse: F) -> Result<T, CommonError>
    where
        F: Fn(&str) -> Result<T, String>,
    {
        self.optional(key, parse)?
            .ok_or_else(|| CommonError::TextParseError {
                line: 0,
                msg: format!("missing key `{key}`"),
            })
    }

    /// Collects `Center{suffix}`, `Width{suffix}`, `Momentum{suffix}`.
    /// Momentum defaults to zero.
    fn packet(&self, suffix: &str, dims: usize) -> Result<Option<WavePacket>, CommonError> {
        let center_key = format!("center{suffix}");
        let Some(center) = self.optional(&center_key, parse_vector)? else {
            return Ok(None);
        };
        let width = self.required(&format!("width{suffix}"), parse_vector)?;
        let momentum = self
            .optional(&format!("momentum{suffix}"), parse_vector)?
            .unwrap_or_else(|| vec![0.0; dims]);
        Ok(Some(WavePacket {
            center,
            width,
            momentum,
        }))
    }
}

fn split_components(value: &str) -> impl Iterator<Item = &str> {
    value
        .trim_matches(|c| matches!(c, '[' | ']' | '(' | ')'))
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

fn parse_scalar(value: &str) -> Result<f64, String> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("`{value}` is not a number: {e}"))
}

fn parse_vector(value: &str) -> Result<Vec<f64>, String> {
    split_components(value).map(parse_scalar).collect()
}

fn parse_sizes(value: &str) -> Result<Vec<usize>, String> {
    split_components(value)
        .map(|s| {
            s.parse::<usize>()
                .map_err(|e| format!("`{s}` is not a grid size: {e}"))
        })
        .collect()
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(format!("`{other}` is not a boolean")),
    }
}

fn parse_potential(value: &str) -> Result<PotentialParameters, String> {
    let mut tokens = value.splitn(2, char::is_whitespace);
    let name = tokens.next().unwrap_or("").to_lowercase();
    let rest = tokens.next().unwrap_or("");

    let fields: HashMap<String, &str> = assignment_regex()
        .map_err(|e| e.to_string())?
        .captures_iter(rest)
        .filter_map(|c| Some((c.get(1)?.as_str().to_lowercase(), c.get(2)?.as_str())))
        .collect();
    let scalar = |field: &str| -> Result<f64, String> {
        let raw = fields
            .get(field)
            .ok_or_else(|| format!("potential `{name}` needs `{field}=`"))?;
        parse_scalar(raw)
    };
    let center = || -> Result<Option<Vec<f64>>, String> {
        fields.get("center").map(|raw| parse_vector(raw)).transpose()
    };

    match name.as_str() {
        "free" | "none" | "" => Ok(PotentialParameters::Free),
        "harmonic" => Ok(PotentialParameters::Harmonic {
            omega: scalar("omega")?,
            center: center()?,
        }),
        "barrier" => Ok(PotentialParameters::Barrier {
            position: scalar("position")?,
            thickness: scalar("thickness")?,
            height: scalar("height")?,
        }),
        "softcoulomb" | "soft_coulomb" | "coulomb" => Ok(PotentialParameters::SoftCoulomb {
            charge: scalar("charge")?,
            softening: scalar("softening")?,
            center: center()?,
        }),
        other => Err(format!("unknown potential `{other}`")),
    }
}

#[cfg(test)]
const SAMPLE_TEXT: &str = "
# drifting packet
Grid Size: 32, 32
Spacing: 1
Mass: 1
Center: 16 16
Width: [3, 3]
Momentum: 0.5, 0
Time Step: 0.01
Total Time: 1.0
Frames: 5
Multithreaded: no
Name: drift
";

#[test]
fn test_parse_run_text_single_particle() {
    let parameters = parse_run_text(SAMPLE_TEXT).unwrap();
    assert_eq!(parameters.size, vec![32, 32]);
    assert_eq!(parameters.masses, vec![1.0]);
    assert_eq!(parameters.packets[0].center, vec![16.0, 16.0]);
    assert_eq!(parameters.packets[0].width, vec![3.0, 3.0]);
    assert_eq!(parameters.packets[0].momentum, vec![0.5, 0.0]);
    assert_eq!(parameters.frames, 5);
    assert!(!parameters.multithreaded);
    assert_eq!(parameters.sim_name, "drift");
    assert_eq!(parameters.potential, PotentialParameters::Free);
    assert_eq!(parameters.damping, None);
    assert!(!parameters.is_two_particle());
}

#[test]
fn test_parse_run_text_two_particles_and_potential() {
    let text = format!(
        "{SAMPLE_TEXT}
Mass 2: 2
Center 2: 10, 10
Width 2: 2, 2
Damping Width: 4
Damping Factor: 0.5
Potential: Harmonic omega=0.25 center=1,2
"
    );
    let parameters = parse_run_text(&text).unwrap();
    assert!(parameters.is_two_particle());
    assert_eq!(parameters.masses, vec![1.0, 2.0]);
    assert_eq!(parameters.packets[1].momentum, vec![0.0, 0.0]);
    assert_eq!(
        parameters.damping,
        Some(DampingParameters {
            width: 4,
            factor: 0.5
        })
    );
    assert_eq!(
        parameters.potential,
        PotentialParameters::Harmonic {
            omega: 0.25,
            center: Some(vec![1.0, 2.0])
        }
    );
}

#[test]
fn test_parse_run_text_rejects_unknown_key() {
    let text = format!("{SAMPLE_TEXT}\nColour: red\n");
    match parse_run_text(&text) {
        Err(CommonError::TextParseError { msg, .. }) => assert!(msg.contains("colour")),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn test_parse_run_text_rejects_mismatched_dimensions() {
    let text = SAMPLE_TEXT.replace("Center: 16 16", "Center: 16 16 16");
    assert!(matches!(
        parse_run_text(&text),
        Err(CommonError::InvalidParameter { name: "center", .. })
    ));
}

#[test]
fn test_deserialize_toml() {
    let toml_str = r#"
        size = [16, 16, 16]
        spacing = 0.5
        masses = [1.0, 1.0]
        dt = 0.01
        total_time = 2.0
        frames = 3
        sim_name = "pair"

        [[packets]]
        center = [2.0, 4.0, 4.0]
        width = [1.0, 1.0, 1.0]
        momentum = [1.0, 0.0, 0.0]

        [[packets]]
        center = [6.0, 4.0, 4.0]
        width = [1.0, 1.0, 1.0]
        momentum = [-1.0, 0.0, 0.0]

        [potential]
        type = "SoftCoulomb"
        charge = 1.0
        softening = 0.5

        [damping]
        width = 2
        factor = 1.0
    "#;
    let parameters: RunParameters = toml::from_str(toml_str).unwrap();
    parameters.validate().unwrap();
    assert_eq!(parameters.dims(), 3);
    assert!(parameters.multithreaded);
    assert!(!parameters.output_npy);
    assert_eq!(
        parameters.potential,
        PotentialParameters::SoftCoulomb {
            charge: 1.0,
            softening: 0.5,
            center: None
        }
    );
}

#[test]
fn test_patterns_compile() {
    let line = line_regex().unwrap();
    let captures = line.captures("  Damping Width :  4 ").unwrap();
    assert_eq!(&captures[1], "Damping Width");
    assert_eq!(&captures[2], "4");
    assert_eq!(assignment_regex().unwrap().captures_iter("omega=0.5 center=1,2").count(), 2);
}
