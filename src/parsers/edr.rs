//! GROMACS energy file (`.edr`) reader.
//!
//! The file is a name header followed by one frame per saved step. The
//! writer appends frames while the simulation runs, so the tail of the
//! file is routinely incomplete; decoding stops at the last whole frame.

use std::collections::BTreeMap;
use std::path::Path;

use super::error::ParseError;
use super::xdr::{Precision, XdrReader};

const NAMES_MAGIC: i32 = -55_555;
const FRAME_MAGIC: i32 = -7_777_777;
const FRAME_MARKER: f64 = -2e10;
const MAX_VERSION: i32 = 5;

/// Energy values keyed by step, then by term name.
pub type EnergySeries = BTreeMap<i64, BTreeMap<String, f64>>;

/// A named energy term declared in the file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnergyTerm {
    pub name: String,
    pub unit: String,
}

/// One saved step.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyFrame {
    pub step: i64,
    /// Simulation time in ps.
    pub time: f64,
    /// Instantaneous values, aligned with [`EnergyFile::terms`].
    pub values: Vec<f64>,
}

/// Decoded contents of an energy file.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyFile {
    pub version: i32,
    pub precision: Option<Precision>,
    pub terms: Vec<EnergyTerm>,
    pub frames: Vec<EnergyFrame>,
    /// Set when trailing bytes did not form a complete frame.
    pub truncated: bool,
}

impl EnergyFile {
    /// Index of a term by name.
    #[must_use]
    pub fn term_index(&self, name: &str) -> Option<usize> {
        self.terms.iter().position(|t| t.name == name)
    }

    /// Values of the requested terms for every frame after `after`.
    ///
    /// Terms missing from the file are ignored; frames carrying none of
    /// the requested terms are left out.
    #[must_use]
    pub fn select(&self, terms: &[String], after: Option<i64>) -> EnergySeries {
        let wanted: Vec<(&str, usize)> = terms
            .iter()
            .filter_map(|t| self.term_index(t).map(|i| (t.as_str(), i)))
            .collect();

        let mut series = EnergySeries::new();
        for frame in &self.frames {
            if after.is_some_and(|last| frame.step <= last) {
                continue;
            }
            let values: BTreeMap<String, f64> = wanted
                .iter()
                .filter_map(|&(name, i)| frame.values.get(i).map(|v| (name.to_string(), *v)))
                .collect();
            if !values.is_empty() {
                series.insert(frame.step, values);
            }
        }
        series
    }
}

/// Block payload element types.
#[derive(Debug, Clone, Copy)]
enum SubType {
    Int,
    Float,
    Double,
    Int64,
    Char,
    String,
    Real,
}

impl SubType {
    fn from_code(code: i32) -> Result<Self, ParseError> {
        Ok(match code {
            0 => Self::Int,
            1 => Self::Float,
            2 => Self::Double,
            3 => Self::Int64,
            4 => Self::Char,
            5 => Self::String,
            other => return Err(ParseError::Corrupt(format!("unknown block type {other}"))),
        })
    }
}

/// Decode an energy file held in memory.
///
/// # Errors
///
/// Returns an error if the name header is missing, truncated, or of an
/// unsupported revision. Problems after the header only end decoding.
pub fn decode(bytes: &[u8]) -> Result<EnergyFile, ParseError> {
    let mut r = XdrReader::new(bytes);
    let (version, terms) = decode_names(&mut r)?;

    let mut file = EnergyFile {
        version,
        precision: None,
        terms,
        frames: Vec::new(),
        truncated: false,
    };

    while !r.is_at_end() {
        let start = r.position();
        match decode_frame(&mut r, &mut file.precision, file.terms.len()) {
            Ok(frame) => file.frames.push(frame),
            Err(e) => {
                tracing::trace!(offset = start, error = %e, "Energy frame incomplete, stopping");
                file.truncated = true;
                break;
            }
        }
    }

    Ok(file)
}

/// Read and decode an energy file from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its header cannot be
/// decoded.
pub fn read_energy_file(path: &Path) -> Result<EnergyFile, ParseError> {
    let bytes = std::fs::read(path).map_err(|e| ParseError::from_io(path, e))?;
    decode(&bytes)
}

/// Energy values recorded after step `after` (all steps when `None`).
///
/// A file that does not exist yet or whose header is still being written
/// yields an empty series.
///
/// # Errors
///
/// Returns an error for conditions that will not clear up by waiting,
/// such as permission problems or an unsupported file revision.
pub fn energy_since(
    path: &Path,
    terms: &[String],
    after: Option<i64>,
) -> Result<EnergySeries, ParseError> {
    match read_energy_file(path) {
        Ok(file) => Ok(file.select(terms, after)),
        Err(e) if e.is_transient() => {
            tracing::debug!(path = %path.display(), error = %e, "Energy file not readable yet");
            Ok(EnergySeries::new())
        }
        Err(e) => Err(e),
    }
}

fn decode_names(r: &mut XdrReader<'_>) -> Result<(i32, Vec<EnergyTerm>), ParseError> {
    let magic = r.int()?;
    if magic > 0 {
        // Pre-magic files start directly with the term count.
        return Err(ParseError::UnsupportedVersion(1));
    }
    if magic != NAMES_MAGIC {
        return Err(ParseError::BadMagic {
            offset: 0,
            expected: NAMES_MAGIC,
            found: magic,
        });
    }

    let version = r.int()?;
    if !(1..=MAX_VERSION).contains(&version) {
        return Err(ParseError::UnsupportedVersion(version));
    }

    let nre = r.count("term count")?;
    let mut terms = Vec::with_capacity(nre.min(1024));
    for _ in 0..nre {
        let name = r.xdr_string()?;
        let unit = if version >= 2 {
            r.xdr_string()?
        } else {
            "kJ/mol".to_string()
        };
        terms.push(EnergyTerm { name, unit });
    }
    Ok((version, terms))
}

fn detect_precision(r: &mut XdrReader<'_>) -> Result<Precision, ParseError> {
    let start = r.position();
    let single = f64::from(r.float()?);
    if is_marker(single) {
        return Ok(Precision::Single);
    }
    r.seek(start);
    let double = r.double()?;
    if is_marker(double) {
        return Ok(Precision::Double);
    }
    Err(ParseError::Corrupt(format!(
        "frame marker not found at byte {start}"
    )))
}

fn is_marker(value: f64) -> bool {
    (value - FRAME_MARKER).abs() < 1.0
}

fn decode_frame(
    r: &mut XdrReader<'_>,
    precision: &mut Option<Precision>,
    nre_names: usize,
) -> Result<EnergyFrame, ParseError> {
    let p = match *precision {
        Some(p) => {
            let offset = r.position();
            if !is_marker(r.real(p)?) {
                return Err(ParseError::Corrupt(format!(
                    "frame marker not found at byte {offset}"
                )));
            }
            p
        }
        None => {
            let p = detect_precision(r)?;
            *precision = Some(p);
            p
        }
    };

    let offset = r.position();
    let magic = r.int()?;
    if magic != FRAME_MAGIC {
        return Err(ParseError::BadMagic {
            offset,
            expected: FRAME_MAGIC,
            found: magic,
        });
    }
    let version = r.int()?;
    if !(1..=MAX_VERSION).contains(&version) {
        return Err(ParseError::UnsupportedVersion(version));
    }

    let time = r.double()?;
    let step = r.int64()?;
    let nsum = r.int()?;
    if version >= 3 {
        let _nsteps = r.int64()?;
    }
    if version >= 5 {
        let _dt = r.double()?;
    }
    let nre = r.count("frame term count")?;
    let ndisre = r.int()?;
    let nblock = r.count("block count")?;

    let mut subs: Vec<(SubType, usize)> = Vec::new();
    if version < 4 && ndisre > 0 {
        let n = usize::try_from(ndisre).unwrap_or_default();
        subs.push((SubType::Real, n));
        subs.push((SubType::Real, n));
    }
    for _ in 0..nblock {
        if version < 4 {
            subs.push((SubType::Real, r.count("block size")?));
        } else {
            let _id = r.int()?;
            let nsub = r.count("sub-block count")?;
            for _ in 0..nsub {
                let kind = SubType::from_code(r.int()?)?;
                subs.push((kind, r.count("sub-block size")?));
            }
        }
    }
    let _e_size = r.int()?;
    let _reserved = r.int()?;
    let _compat = r.int()?;

    if nre != 0 && nre != nre_names {
        return Err(ParseError::Corrupt(format!(
            "frame at step {step} has {nre} terms, header declares {nre_names}"
        )));
    }

    let with_sums = version == 1 || nsum > 0;
    let mut values = Vec::with_capacity(nre);
    for _ in 0..nre {
        values.push(r.real(p)?);
        if with_sums {
            let _eav = r.real(p)?;
            let _esum = r.real(p)?;
            if version == 1 {
                let _unused = r.real(p)?;
            }
        }
    }

    for (kind, n) in subs {
        skip_sub_block(r, kind, n, p)?;
    }

    Ok(EnergyFrame { step, time, values })
}

fn skip_sub_block(
    r: &mut XdrReader<'_>,
    kind: SubType,
    n: usize,
    precision: Precision,
) -> Result<(), ParseError> {
    let width = match kind {
        SubType::Int | SubType::Float | SubType::Char => 4,
        SubType::Double | SubType::Int64 => 8,
        SubType::Real => match precision {
            Precision::Single => 4,
            Precision::Double => 8,
        },
        SubType::String => {
            for _ in 0..n {
                r.gmx_string()?;
            }
            return Ok(());
        }
    };
    let len = n
        .checked_mul(width)
        .ok_or_else(|| ParseError::Corrupt(format!("sub-block of {n} elements overflows")))?;
    r.skip(len)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Energy file encoder for fixtures.

    use super::super::xdr::testing::XdrWriter;
    use super::super::xdr::Precision;
    use super::{FRAME_MAGIC, FRAME_MARKER, NAMES_MAGIC};

    /// Builds a version 5 energy file.
    #[derive(Debug)]
    pub(crate) struct EdrBuilder {
        w: XdrWriter,
        precision: Precision,
        nre: usize,
    }

    impl EdrBuilder {
        pub(crate) fn new(terms: &[&str], precision: Precision) -> Self {
            let mut w = XdrWriter::default();
            w.int(NAMES_MAGIC)
                .int(5)
                .int(i32::try_from(terms.len()).unwrap());
            for t in terms {
                w.xdr_string(t).xdr_string("kJ/mol");
            }
            Self {
                w,
                precision,
                nre: terms.len(),
            }
        }

        fn real(&mut self, v: f64) {
            match self.precision {
                #[allow(clippy::cast_possible_truncation)]
                Precision::Single => self.w.float(v as f32),
                Precision::Double => self.w.double(v),
            };
        }

        pub(crate) fn frame(&mut self, step: i64, values: &[f64]) -> &mut Self {
            self.frame_with(step, values, 0, false)
        }

        pub(crate) fn frame_with(
            &mut self,
            step: i64,
            values: &[f64],
            nsum: i32,
            with_block: bool,
        ) -> &mut Self {
            assert_eq!(values.len(), self.nre);
            self.real(FRAME_MARKER);
            #[allow(clippy::cast_precision_loss)]
            let time = step as f64 * 0.002;
            self.w
                .int(FRAME_MAGIC)
                .int(5)
                .double(time)
                .int64(step)
                .int(nsum)
                .int64(1)
                .double(0.002)
                .int(i32::try_from(self.nre).unwrap())
                .int(0)
                .int(i32::from(with_block));
            if with_block {
                // id, one sub-block of three doubles
                self.w.int(7).int(1).int(2).int(3);
            }
            self.w.int(0).int(0).int(0);
            for v in values {
                self.real(*v);
                if nsum > 0 {
                    self.real(*v);
                    self.real(*v * f64::from(nsum));
                }
            }
            if with_block {
                self.w.double(1.0).double(2.0).double(3.0);
            }
            self
        }

        pub(crate) fn bytes(&self) -> Vec<u8> {
            self.w.buf.clone()
        }
    }
}
