//! Hand-built ICS files, for layouts the writer never produces.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;

pub struct IcsFileBuilder {
    version: &'static str,
    tags: Vec<String>,
    sizes: Vec<usize>,
    format: &'static str,
    sign: &'static str,
    bits: usize,
    byte_order: Vec<usize>,
    gzip: bool,
    scales: Vec<f64>,
    units: Vec<String>,
    history: Vec<String>,
}

impl IcsFileBuilder {
    /// An unsigned 8-bit file with the given axis tags and sizes, in file order.
    pub fn new(tags: &[&str], sizes: &[usize]) -> Self {
        Self {
            version: "2.0",
            tags: tags.iter().map(|s| s.to_string()).collect(),
            sizes: sizes.to_vec(),
            format: "integer",
            sign: "unsigned",
            bits: 8,
            byte_order: vec![1],
            gzip: false,
            scales: Vec::new(),
            units: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn representation(mut self, format: &'static str, sign: &'static str, bits: usize) -> Self {
        self.format = format;
        self.sign = sign;
        self.bits = bits;
        self.byte_order = (1..=bits / 8).collect();
        self
    }

    /// Declares the data as big endian; the caller supplies big-endian bytes.
    pub fn big_endian(mut self) -> Self {
        self.byte_order.reverse();
        self
    }

    pub fn gzip(mut self) -> Self {
        self.gzip = true;
        self
    }

    pub fn version1(mut self) -> Self {
        self.version = "1.0";
        self
    }

    pub fn calibration(mut self, scales: &[f64], units: &[&str]) -> Self {
        self.scales = scales.to_vec();
        self.units = units.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn history(mut self, line: &str) -> Self {
        self.history.push(line.to_string());
        self
    }

    fn header(&self) -> String {
        let join = |v: Vec<String>| v.join("\t");
        let mut h = String::from("\t\n");
        h += &format!("ics_version\t{}\n", self.version);
        h += "filename\tbuilt\n";
        h += &format!("layout\tparameters\t{}\n", self.sizes.len() + 1);
        h += &format!("layout\torder\tbits\t{}\n", self.tags.join("\t"));
        h += &format!(
            "layout\tsizes\t{}\t{}\n",
            self.bits,
            join(self.sizes.iter().map(|s| s.to_string()).collect())
        );
        h += "layout\tcoordinates\tvideo\n";
        h += &format!("representation\tformat\t{}\n", self.format);
        h += &format!("representation\tsign\t{}\n", self.sign);
        h += &format!(
            "representation\tcompression\t{}\n",
            if self.gzip { "gzip" } else { "uncompressed" }
        );
        h += &format!(
            "representation\tbyte_order\t{}\n",
            join(self.byte_order.iter().map(|b| b.to_string()).collect())
        );
        if !self.scales.is_empty() {
            h += &format!(
                "parameter\tscale\t1.0\t{}\n",
                join(self.scales.iter().map(|s| s.to_string()).collect())
            );
            h += &format!("parameter\tunits\trelative\t{}\n", self.units.join("\t"));
        }
        for line in &self.history {
            h += &format!("history\t{}\n", line);
        }
        h += "end\n";
        h
    }

    /// Writes `<dir>/<name>.ics` (and `.ids` for version 1) with `data`
    /// stored in file order. Returns the header path.
    pub fn write(&self, dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let header_path = dir.join(format!("{}.ics", name));
        let mut header = File::create(&header_path).unwrap();
        header.write_all(self.header().as_bytes()).unwrap();
        let mut out = if self.version == "1.0" {
            File::create(dir.join(format!("{}.ids", name))).unwrap()
        } else {
            header
        };
        if self.gzip {
            let mut encoder = GzEncoder::new(&mut out, flate2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap();
        } else {
            out.write_all(data).unwrap();
        }
        header_path
    }
}
