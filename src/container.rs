//! ICS container: header text and raw sample stream.
//!
//! An ICS file is a tab-separated text header followed by the samples,
//! either inline after the `end` line (version 2.0) or in a companion
//! `.ids` file (version 1.0). Samples are stored densely with the first
//! axis varying fastest, optionally gzip-compressed.
//!
//! This module knows nothing about axis semantics; it reads and writes
//! exactly the axes and tags it is given.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::image::{Layout, try_for_each_coordinate};
use crate::utils::{is_little_endian, swap_endianness_in_place};

/// Longest header line, including the line separator.
pub const ICS_LINE_LENGTH: usize = 256;

const FIELD_SEP: u8 = b'\t';
const LINE_SEP: u8 = b'\n';

/// gzip level used for compressed data.
const GZIP_LEVEL: u32 = 9;

const DEFAULT_ORDER_NAMES: [&str; 5] = ["x", "y", "z", "t", "probe"];

/// File format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcsVersion {
    /// Header in `.ics`, data in `.ids`.
    V1,
    /// Header and data in one `.ics` file.
    V2,
}

impl IcsVersion {
    fn as_str(&self) -> &'static str {
        match self {
            IcsVersion::V1 => "1.0",
            IcsVersion::V2 => "2.0",
        }
    }
}

/// Compression of the sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Uncompressed,
    Gzip,
}

impl Compression {
    fn as_str(&self) -> &'static str {
        match self {
            Compression::Uncompressed => "uncompressed",
            Compression::Gzip => "gzip",
        }
    }
}

/// Sample representation as stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcsDataType {
    Uint8,
    Sint8,
    Uint16,
    Sint16,
    Uint32,
    Sint32,
    Real32,
    Real64,
    Complex32,
    Complex64,
}

impl IcsDataType {
    /// Bits per sample, as in the first column of `layout sizes`.
    pub fn bits(&self) -> usize {
        match self {
            IcsDataType::Uint8 | IcsDataType::Sint8 => 8,
            IcsDataType::Uint16 | IcsDataType::Sint16 => 16,
            IcsDataType::Uint32 | IcsDataType::Sint32 | IcsDataType::Real32 => 32,
            IcsDataType::Real64 | IcsDataType::Complex32 => 64,
            IcsDataType::Complex64 => 128,
        }
    }

    pub fn size_of(&self) -> usize {
        self.bits() / 8
    }

    /// Bytes per scalar component; the unit of byte swapping.
    pub fn component_size(&self) -> usize {
        match self {
            IcsDataType::Complex32 | IcsDataType::Complex64 => self.size_of() / 2,
            _ => self.size_of(),
        }
    }

    fn format(&self) -> &'static str {
        match self {
            IcsDataType::Real32 | IcsDataType::Real64 => "real",
            IcsDataType::Complex32 | IcsDataType::Complex64 => "complex",
            _ => "integer",
        }
    }

    fn is_signed(&self) -> bool {
        !matches!(self, IcsDataType::Uint8 | IcsDataType::Uint16 | IcsDataType::Uint32)
    }

    fn from_representation(format: &str, signed: bool, bits: usize) -> Result<Self> {
        let dt = match (format, signed, bits) {
            ("integer", false, 8) => IcsDataType::Uint8,
            ("integer", true, 8) => IcsDataType::Sint8,
            ("integer", false, 16) => IcsDataType::Uint16,
            ("integer", true, 16) => IcsDataType::Sint16,
            ("integer", false, 32) => IcsDataType::Uint32,
            ("integer", true, 32) => IcsDataType::Sint32,
            ("real", _, 32) => IcsDataType::Real32,
            ("real", _, 64) => IcsDataType::Real64,
            ("complex", _, 64) => IcsDataType::Complex32,
            ("complex", _, 128) => IcsDataType::Complex64,
            _ => {
                return Err(Error::UnsupportedSampleType(format!(
                    "{} {} of {} bits",
                    if signed { "signed" } else { "unsigned" },
                    format,
                    bits
                )));
            }
        };
        Ok(dt)
    }
}

/// One axis as declared in the header.
#[derive(Debug, Clone, PartialEq)]
pub struct IcsDimension {
    pub size: usize,
    /// Axis tag from `layout order`.
    pub order: String,
    pub origin: f64,
    pub scale: f64,
    /// Unit string from `parameter units`; `undefined` if not given.
    pub units: String,
}

impl IcsDimension {
    fn new(size: usize, order: String) -> Self {
        Self { size, order, origin: 0.0, scale: 1.0, units: "undefined".to_string() }
    }
}

/// Parsed ICS header.
#[derive(Debug, Clone, PartialEq)]
pub struct IcsHeader {
    pub version: IcsVersion,
    pub filename: String,
    pub data_type: IcsDataType,
    pub dims: Vec<IcsDimension>,
    /// `0` when the header does not say.
    pub significant_bits: usize,
    pub compression: Compression,
    /// 1-based byte positions of one component, least significant first.
    pub byte_order: Vec<usize>,
    pub coordinates: String,
    /// History lines without the leading `history` keyword.
    pub history: Vec<String>,
}

/// Default axis tag for axis `ii`: `x, y, z, t, probe, dim_5, ...`.
pub fn default_order_name(ii: usize) -> String {
    DEFAULT_ORDER_NAMES
        .get(ii)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("dim_{}", ii))
}

fn native_byte_order(component_size: usize) -> Vec<usize> {
    if is_little_endian() {
        (1..=component_size).collect()
    } else {
        (1..=component_size).rev().collect()
    }
}

impl IcsHeader {
    /// A header for `sizes` with default axis tags and no calibration.
    pub fn new(version: IcsVersion, data_type: IcsDataType, sizes: &[usize]) -> Self {
        Self {
            version,
            filename: String::new(),
            data_type,
            dims: sizes
                .iter()
                .enumerate()
                .map(|(ii, &size)| IcsDimension::new(size, default_order_name(ii)))
                .collect(),
            significant_bits: 0,
            compression: Compression::Gzip,
            byte_order: native_byte_order(data_type.component_size()),
            coordinates: "video".to_string(),
            history: Vec::new(),
        }
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.size).collect()
    }

    /// Bytes of sample data the header describes.
    pub fn data_size(&self) -> usize {
        self.dims
            .iter()
            .fold(self.data_type.size_of(), |acc, d| acc.saturating_mul(d.size))
    }

    /// True if samples are stored in the opposite byte order from the host.
    pub fn needs_byte_swap(&self) -> bool {
        if self.byte_order.len() < 2 {
            return false;
        }
        let file_little = self.byte_order[0] == 1;
        file_little != is_little_endian()
    }

    /// Parses a header, returning it with the byte offset just past the
    /// `end` line.
    pub fn parse<R: BufRead>(reader: &mut R) -> Result<(Self, u64)> {
        let mut seps = [0u8; 2];
        reader
            .read_exact(&mut seps)
            .map_err(|_| Error::HeaderParse("file too short for an ICS header".into()))?;
        let (field_sep, line_sep) = (seps[0], seps[1]);
        let mut consumed = 2u64;

        let mut version = None;
        let mut filename = String::new();
        let mut order: Vec<String> = Vec::new();
        let mut sizes: Vec<usize> = Vec::new();
        let mut bits = None;
        let mut significant_bits = 0usize;
        let mut format = "integer".to_string();
        let mut signed = false;
        let mut compression = Compression::Uncompressed;
        let mut byte_order = Vec::new();
        let mut coordinates = "video".to_string();
        let mut origins: Vec<f64> = Vec::new();
        let mut scales: Vec<f64> = Vec::new();
        let mut units: Vec<String> = Vec::new();
        let mut history = Vec::new();
        let mut saw_end = false;

        let mut raw = Vec::new();
        loop {
            raw.clear();
            let n = reader.read_until(line_sep, &mut raw)?;
            if n == 0 {
                break;
            }
            consumed += n as u64;
            if raw.last() == Some(&line_sep) {
                raw.pop();
            }
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            let line = String::from_utf8_lossy(&raw);
            let fields: Vec<&str> = line.split(field_sep as char).collect();
            match fields.as_slice() {
                [""] => {}
                ["end", ..] => {
                    saw_end = true;
                    break;
                }
                ["ics_version", v, ..] => {
                    version = Some(match v.trim() {
                        "1.0" => IcsVersion::V1,
                        "2.0" => IcsVersion::V2,
                        other => return Err(Error::HeaderParse(format!("unknown ICS version '{}'", other))),
                    });
                }
                ["filename", name, ..] => filename = name.to_string(),
                ["layout", "order", _bits, names @ ..] => order = names.iter().map(|s| s.to_string()).collect(),
                ["layout", "sizes", b, rest @ ..] => {
                    bits = Some(parse_number::<usize>(b, "layout sizes")?);
                    sizes = rest
                        .iter()
                        .map(|s| parse_number::<usize>(s, "layout sizes"))
                        .collect::<Result<_>>()?;
                }
                ["layout", "coordinates", c, ..] => coordinates = c.to_string(),
                ["layout", "significant_bits", b, ..] => significant_bits = parse_number(b, "significant_bits")?,
                ["representation", "format", f, ..] => format = f.to_ascii_lowercase(),
                ["representation", "sign", s, ..] => signed = s.eq_ignore_ascii_case("signed"),
                ["representation", "compression", c, ..] => {
                    compression = match c.to_ascii_lowercase().as_str() {
                        "uncompressed" => Compression::Uncompressed,
                        "gzip" => Compression::Gzip,
                        other => {
                            return Err(Error::HeaderParse(format!("unsupported compression '{}'", other)));
                        }
                    }
                }
                ["representation", "byte_order", rest @ ..] => {
                    byte_order = rest
                        .iter()
                        .flat_map(|s| s.split_whitespace())
                        .map(|s| parse_number::<usize>(s, "byte_order"))
                        .collect::<Result<_>>()?;
                }
                ["parameter", "origin", _, rest @ ..] => {
                    origins = rest.iter().map(|s| parse_number(s, "parameter origin")).collect::<Result<_>>()?;
                }
                ["parameter", "scale", _, rest @ ..] => {
                    scales = rest.iter().map(|s| parse_number(s, "parameter scale")).collect::<Result<_>>()?;
                }
                ["parameter", "units", _, rest @ ..] => units = rest.iter().map(|s| s.to_string()).collect(),
                ["history", rest @ ..] => history.push(rest.join("\t")),
                _ => trace!(line = %line, "ignoring header line"),
            }
        }

        let version = version.ok_or_else(|| Error::HeaderParse("missing ics_version".into()))?;
        if version == IcsVersion::V2 && !saw_end {
            return Err(Error::HeaderParse("missing end of header".into()));
        }
        let bits = bits.ok_or_else(|| Error::HeaderParse("missing layout sizes".into()))?;
        if sizes.is_empty() {
            return Err(Error::HeaderParse("image has no dimensions".into()));
        }
        let data_type = IcsDataType::from_representation(&format, signed, bits)?;

        let dims = sizes
            .iter()
            .enumerate()
            .map(|(ii, &size)| IcsDimension {
                size,
                order: order.get(ii).cloned().unwrap_or_else(|| default_order_name(ii)),
                origin: origins.get(ii).copied().unwrap_or(0.0),
                scale: scales.get(ii).copied().unwrap_or(1.0),
                units: units.get(ii).cloned().unwrap_or_else(|| "undefined".to_string()),
            })
            .collect();

        let header = Self {
            version,
            filename,
            data_type,
            dims,
            significant_bits,
            compression,
            byte_order: if byte_order.is_empty() {
                native_byte_order(data_type.component_size())
            } else {
                byte_order
            },
            coordinates,
            history,
        };
        Ok((header, consumed))
    }

    /// Header text, up to and including the `end` line.
    pub fn to_text(&self) -> String {
        fn line(fields: &[&str]) -> String {
            let mut s = fields.join("\t");
            s.push('\n');
            s
        }
        let n = self.dims.len();
        let mut text = String::from("\t\n");
        text += &line(&["ics_version", self.version.as_str()]);
        text += &line(&["filename", self.filename.as_str()]);
        let parameters = (n + 1).to_string();
        text += &line(&["layout", "parameters", parameters.as_str()]);

        let mut order = vec!["layout", "order", "bits"];
        order.extend(self.dims.iter().map(|d| d.order.as_str()));
        text += &line(&order);

        let sizes: Vec<String> = std::iter::once(self.data_type.bits())
            .chain(self.dims.iter().map(|d| d.size))
            .map(|s| s.to_string())
            .collect();
        let mut fields = vec!["layout", "sizes"];
        fields.extend(sizes.iter().map(String::as_str));
        text += &line(&fields);

        text += &line(&["layout", "coordinates", self.coordinates.as_str()]);
        if self.significant_bits > 0 {
            let bits = self.significant_bits.to_string();
            text += &line(&["layout", "significant_bits", bits.as_str()]);
        }
        text += &line(&["representation", "format", self.data_type.format()]);
        text += &line(&["representation", "sign", if self.data_type.is_signed() { "signed" } else { "unsigned" }]);
        text += &line(&["representation", "compression", self.compression.as_str()]);
        let byte_order: Vec<String> = self.byte_order.iter().map(|b| b.to_string()).collect();
        let mut fields = vec!["representation", "byte_order"];
        fields.extend(byte_order.iter().map(String::as_str));
        text += &line(&fields);

        let origins: Vec<String> = self.dims.iter().map(|d| d.origin.to_string()).collect();
        let scales: Vec<String> = self.dims.iter().map(|d| d.scale.to_string()).collect();
        let mut fields = vec!["parameter", "origin", "0"];
        fields.extend(origins.iter().map(String::as_str));
        text += &line(&fields);
        let mut fields = vec!["parameter", "scale", "1"];
        fields.extend(scales.iter().map(String::as_str));
        text += &line(&fields);
        let mut fields = vec!["parameter", "units", "relative"];
        fields.extend(self.dims.iter().map(|d| d.units.as_str()));
        text += &line(&fields);

        for h in &self.history {
            text += &line(&["history", h.as_str()]);
        }
        text += &line(&["end"]);
        text
    }

    /// Returns the version of the header at `path` if the file looks like ICS.
    pub fn probe(path: &Path) -> Option<IcsVersion> {
        let mut reader = BufReader::new(File::open(path).ok()?);
        let mut seps = [0u8; 2];
        reader.read_exact(&mut seps).ok()?;
        let mut raw = Vec::new();
        reader.take(ICS_LINE_LENGTH as u64).read_until(seps[1], &mut raw).ok()?;
        let line = String::from_utf8_lossy(&raw);
        let mut fields = line.trim_end_matches(['\r', '\n']).split(seps[0] as char);
        if fields.next()? != "ics_version" {
            return None;
        }
        match fields.next()?.trim_end_matches(seps[1] as char).trim() {
            "1.0" => Some(IcsVersion::V1),
            "2.0" => Some(IcsVersion::V2),
            _ => None,
        }
    }
}

fn parse_number<T: std::str::FromStr>(s: &str, what: &str) -> Result<T> {
    s.trim()
        .parse()
        .map_err(|_| Error::HeaderParse(format!("invalid value '{}' in {}", s, what)))
}

/// Header file names to try when opening `path` for reading: the exact
/// name first, then the name with an `.ics` extension.
fn header_candidates(path: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![path.to_path_buf()];
    let alternative = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("ics") => None,
        Some(ext) if ext.eq_ignore_ascii_case("ids") => Some(path.with_extension("ics")),
        _ => {
            let mut s = path.as_os_str().to_owned();
            s.push(".ics");
            Some(PathBuf::from(s))
        }
    };
    candidates.extend(alternative);
    candidates
}

/// `<base>.ics` for any of `base`, `base.ics` or `base.ids`.
fn normalized_header_path(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("ics") || ext.eq_ignore_ascii_case("ids") => path.with_extension("ics"),
        _ => {
            let mut s = path.as_os_str().to_owned();
            s.push(".ics");
            PathBuf::from(s)
        }
    }
}

fn map_read_error(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::UnexpectedEof
    } else {
        Error::Io(e)
    }
}

/// Read handle on an ICS file.
///
/// Sample data is consumed strictly forward: [`skip_data_block`](IcsReader::skip_data_block)
/// and [`read_data_block`](IcsReader::read_data_block) advance a cursor
/// that never moves back, so gzip streams are read in a single pass.
pub struct IcsReader {
    header: IcsHeader,
    header_path: PathBuf,
    data_path: PathBuf,
    data_offset: u64,
    stream: Option<Box<dyn Read>>,
    position: u64,
    closed: bool,
}

impl std::fmt::Debug for IcsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcsReader")
            .field("header_path", &self.header_path)
            .field("data_path", &self.data_path)
            .field("position", &self.position)
            .field("closed", &self.closed)
            .finish()
    }
}

impl IcsReader {
    /// Opens an ICS file and parses its header. The exact name is tried
    /// first, then the name with an `.ics` extension.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut open_error = None;
        let mut parse_error = None;
        for candidate in header_candidates(path) {
            let file = match File::open(&candidate) {
                Ok(file) => file,
                Err(e) => {
                    open_error.get_or_insert(e);
                    continue;
                }
            };
            match IcsHeader::parse(&mut BufReader::new(file)) {
                Ok((header, data_offset)) => {
                    let (data_path, data_offset) = match header.version {
                        IcsVersion::V1 => (candidate.with_extension("ids"), 0),
                        IcsVersion::V2 => (candidate.clone(), data_offset),
                    };
                    debug!(path = %candidate.display(), version = ?header.version, "opened ICS file");
                    return Ok(Self {
                        header,
                        header_path: candidate,
                        data_path,
                        data_offset,
                        stream: None,
                        position: 0,
                        closed: false,
                    });
                }
                Err(e) => {
                    parse_error.get_or_insert(e);
                }
            }
        }
        match (parse_error, open_error) {
            (Some(e), _) => Err(e),
            (None, Some(source)) => Err(Error::FileOpen { path: path.to_path_buf(), source }),
            (None, None) => Err(Error::FileOpen {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no candidate file names"),
            }),
        }
    }

    pub fn header(&self) -> &IcsHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.header_path
    }

    fn stream(&mut self) -> Result<&mut Box<dyn Read>> {
        if self.closed {
            return Err(Error::Io(io::Error::other("ICS file is closed")));
        }
        if self.stream.is_none() {
            let mut file = File::open(&self.data_path).map_err(|source| Error::FileOpen {
                path: self.data_path.clone(),
                source,
            })?;
            file.seek(SeekFrom::Start(self.data_offset))?;
            let reader = BufReader::new(file);
            let stream: Box<dyn Read> = match self.header.compression {
                Compression::Uncompressed => Box::new(reader),
                Compression::Gzip => Box::new(GzDecoder::new(reader)),
            };
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| Error::InternalConsistency("data stream not open".into()))
    }

    /// Reads all sample data into `buf`, which must be exactly the data size.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.header.data_size() {
            return Err(Error::InvalidImage(format!(
                "buffer of {} bytes for {} bytes of pixel data",
                buf.len(),
                self.header.data_size()
            )));
        }
        if self.position != 0 {
            return Err(Error::InternalConsistency("bulk read after partial read".into()));
        }
        self.read_data_block(buf)
    }

    /// Reads the next `buf.len()` bytes of sample data, converted to host
    /// byte order.
    pub fn read_data_block(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream()?.read_exact(buf).map_err(map_read_error)?;
        self.position += buf.len() as u64;
        if self.header.needs_byte_swap() {
            swap_endianness_in_place(buf, self.header.data_type.component_size());
        }
        Ok(())
    }

    /// Skips `n` bytes of sample data.
    pub fn skip_data_block(&mut self, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let skipped = io::copy(&mut self.stream()?.take(n), &mut io::sink())?;
        if skipped != n {
            return Err(Error::UnexpectedEof);
        }
        self.position += n;
        Ok(())
    }

    /// Closes the file. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.stream = None;
        self.closed = true;
        Ok(())
    }
}

enum PendingData<'a> {
    Contiguous(&'a [u8]),
    Strided { data: &'a [u8], layout: Layout, sample_size: usize },
}

/// Write handle on an ICS file.
///
/// The header and samples are written when the handle is closed. A handle
/// dropped without [`close`](IcsWriter::close) is closed with errors ignored.
pub struct IcsWriter<'a> {
    header: IcsHeader,
    header_path: PathBuf,
    file: Option<File>,
    data: Option<PendingData<'a>>,
    closed: bool,
}

impl<'a> IcsWriter<'a> {
    /// Creates `<base>.ics` (and, for version 1, later `<base>.ids`).
    pub fn create(path: impl AsRef<Path>, version: IcsVersion) -> Result<Self> {
        let header_path = normalized_header_path(path.as_ref());
        let file = File::create(&header_path).map_err(|source| Error::FileOpen {
            path: header_path.clone(),
            source,
        })?;
        let mut header = IcsHeader::new(version, IcsDataType::Uint8, &[]);
        header.filename = header_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { header, header_path, file: Some(file), data: None, closed: false })
    }

    pub fn path(&self) -> &Path {
        &self.header_path
    }

    pub fn header(&self) -> &IcsHeader {
        &self.header
    }

    /// Sets the sample type and axis sizes; axes get default tags.
    pub fn set_layout(&mut self, data_type: IcsDataType, sizes: &[usize]) {
        let mut header = IcsHeader::new(self.header.version, data_type, sizes);
        header.filename = std::mem::take(&mut self.header.filename);
        header.compression = self.header.compression;
        header.history = std::mem::take(&mut self.header.history);
        self.header = header;
    }

    pub fn set_order(&mut self, dim: usize, name: &str) -> Result<()> {
        self.dim_mut(dim)?.order = name.to_string();
        Ok(())
    }

    pub fn set_position(&mut self, dim: usize, origin: f64, scale: f64, units: Option<&str>) -> Result<()> {
        let d = self.dim_mut(dim)?;
        d.origin = origin;
        d.scale = scale;
        d.units = match units {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => "undefined".to_string(),
        };
        Ok(())
    }

    fn dim_mut(&mut self, dim: usize) -> Result<&mut IcsDimension> {
        let size = self.header.dims.len();
        self.header
            .dims
            .get_mut(dim)
            .ok_or(Error::IndexOutOfRange { index: dim as isize, size })
    }

    /// Axis descriptors in file order, for reordering before data is set.
    pub fn dims_mut(&mut self) -> &mut Vec<IcsDimension> {
        &mut self.header.dims
    }

    pub fn set_significant_bits(&mut self, bits: usize) {
        self.header.significant_bits = bits;
    }

    pub fn set_compression(&mut self, compression: Compression) {
        self.header.compression = compression;
    }

    /// Appends a history line, `key\tvalue` or just `value`.
    pub fn add_history(&mut self, key: Option<&str>, value: &str) -> Result<()> {
        let line = match key {
            Some(key) => {
                if key.bytes().any(|b| b == FIELD_SEP || b == LINE_SEP || b == b'\r') {
                    return Err(Error::HistoryLineIllegal);
                }
                format!("{}\t{}", key, value)
            }
            None => value.to_string(),
        };
        if line.bytes().any(|b| b == LINE_SEP || b == b'\r') {
            return Err(Error::HistoryLineIllegal);
        }
        let length = "history".len() + 1 + line.len() + 1;
        if length > ICS_LINE_LENGTH {
            return Err(Error::HistoryLineTooLong { length, limit: ICS_LINE_LENGTH });
        }
        self.header.history.push(line);
        Ok(())
    }

    /// Uses `data`, densely stored in file order, as the sample data.
    pub fn set_data(&mut self, data: &'a [u8]) -> Result<()> {
        if data.len() != self.header.data_size() {
            return Err(Error::InvalidImage(format!(
                "{} bytes of pixel data for a header describing {}",
                data.len(),
                self.header.data_size()
            )));
        }
        self.data = Some(PendingData::Contiguous(data));
        Ok(())
    }

    /// Uses the samples of `data` addressed by `layout` as the sample data.
    /// The layout axes must match the header axes.
    pub fn set_data_with_strides(&mut self, data: &'a [u8], layout: Layout, sample_size: usize) -> Result<()> {
        if layout.sizes != self.header.sizes() {
            return Err(Error::ArraySizeMismatch {
                expected: self.header.dims.len(),
                found: layout.sizes.len(),
            });
        }
        self.data = Some(PendingData::Strided { data, layout, sample_size });
        Ok(())
    }

    /// Writes header and data and closes the file. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let file = self.file.take().ok_or_else(|| Error::InternalConsistency("header file missing".into()))?;
        let data = self.data.take().ok_or_else(|| Error::InvalidImage("no pixel data was set".into()))?;

        let mut header_out = BufWriter::new(file);
        header_out.write_all(self.header.to_text().as_bytes())?;
        let data_out = match self.header.version {
            IcsVersion::V2 => header_out,
            IcsVersion::V1 => {
                header_out.flush()?;
                let ids_path = self.header_path.with_extension("ids");
                let ids = File::create(&ids_path).map_err(|source| Error::FileOpen { path: ids_path, source })?;
                BufWriter::new(ids)
            }
        };

        match self.header.compression {
            Compression::Uncompressed => {
                let mut out = data_out;
                write_samples(&mut out, &data)?;
                out.flush()?;
            }
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(data_out, flate2::Compression::new(GZIP_LEVEL));
                write_samples(&mut encoder, &data)?;
                encoder.finish()?.flush()?;
            }
        }
        debug!(path = %self.header_path.display(), bytes = self.header.data_size(), "wrote ICS file");
        Ok(())
    }
}

fn write_samples<W: Write>(out: &mut W, data: &PendingData<'_>) -> Result<()> {
    match data {
        PendingData::Contiguous(bytes) => out.write_all(bytes)?,
        PendingData::Strided { data, layout, sample_size } => {
            try_for_each_coordinate(&layout.sizes, |coords| {
                let start = layout.offset(coords) as usize * sample_size;
                out.write_all(&data[start..start + sample_size])
            })?;
        }
    }
    Ok(())
}

impl Drop for IcsWriter<'_> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}
