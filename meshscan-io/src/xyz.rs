//! Delimited text reader for capture samples
//!
//! One sample per row. Columns are separated by whitespace, commas, tabs or
//! semicolons, detected from the first data-bearing line. An optional header
//! row names the columns; without one the layout is `x y z nx ny nz`.
//! Blank lines and lines starting with `#` are ignored.

use meshscan_core::{Error, Point3f, Result, ScanCloud, ScanPoint, Vector3f};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Column separators understood by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Whitespace,
    Tab,
    Semicolon,
}

impl Delimiter {
    /// Pick the separator that occurs most often in `line`
    pub fn detect_from_line(line: &str) -> Self {
        let counts = [
            (line.matches(',').count(), Delimiter::Comma),
            (line.matches(';').count(), Delimiter::Semicolon),
            (line.matches('\t').count(), Delimiter::Tab),
        ];

        counts
            .iter()
            .filter(|(count, _)| *count > 0)
            .max_by_key(|(count, _)| *count)
            .map(|(_, delimiter)| *delimiter)
            .unwrap_or(Delimiter::Whitespace)
    }

    /// Split a row into trimmed fields
    pub fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self {
            Delimiter::Whitespace => line.split_whitespace().collect(),
            Delimiter::Comma => line.split(',').map(str::trim).collect(),
            Delimiter::Tab => line.split('\t').map(str::trim).collect(),
            Delimiter::Semicolon => line.split(';').map(str::trim).collect(),
        }
    }
}

/// Meaning of one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    X,
    Y,
    Z,
    NormalX,
    NormalY,
    NormalZ,
    Red,
    Green,
    Blue,
    Confidence,
    Unknown,
}

impl ColumnType {
    /// Map a header name to a column type
    pub fn from_header(header: &str) -> Self {
        match header.trim().to_lowercase().as_str() {
            "x" | "px" | "pos_x" | "position_x" => ColumnType::X,
            "y" | "py" | "pos_y" | "position_y" => ColumnType::Y,
            "z" | "pz" | "pos_z" | "position_z" => ColumnType::Z,
            "nx" | "normal_x" | "n_x" => ColumnType::NormalX,
            "ny" | "normal_y" | "n_y" => ColumnType::NormalY,
            "nz" | "normal_z" | "n_z" => ColumnType::NormalZ,
            "r" | "red" | "color_r" => ColumnType::Red,
            "g" | "green" | "color_g" => ColumnType::Green,
            "b" | "blue" | "color_b" => ColumnType::Blue,
            "c" | "confidence" | "conf" => ColumnType::Confidence,
            _ => ColumnType::Unknown,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ColumnType::X => "x",
            ColumnType::Y => "y",
            ColumnType::Z => "z",
            ColumnType::NormalX => "nx",
            ColumnType::NormalY => "ny",
            ColumnType::NormalZ => "nz",
            ColumnType::Red => "red",
            ColumnType::Green => "green",
            ColumnType::Blue => "blue",
            ColumnType::Confidence => "confidence",
            ColumnType::Unknown => "unknown",
        }
    }
}

/// Column layout of a sample file
#[derive(Debug, Clone, PartialEq)]
pub struct XyzSchema {
    pub columns: Vec<ColumnType>,
    pub has_header: bool,
    pub delimiter: Delimiter,
}

impl XyzSchema {
    /// Layout assumed for files without a header row
    pub fn headerless(delimiter: Delimiter) -> Self {
        Self {
            columns: vec![
                ColumnType::X,
                ColumnType::Y,
                ColumnType::Z,
                ColumnType::NormalX,
                ColumnType::NormalY,
                ColumnType::NormalZ,
            ],
            has_header: false,
            delimiter,
        }
    }

    /// Infer the layout from the first non-comment line.
    ///
    /// The line is a header when any of its fields fails to parse as a
    /// number. A header must name all position and normal columns.
    pub fn detect(first_line: &str, line_number: usize) -> Result<Self> {
        let delimiter = Delimiter::detect_from_line(first_line);
        let fields = delimiter.split(first_line);

        if fields.iter().all(|f| f.parse::<f32>().is_ok()) {
            return Ok(Self::headerless(delimiter));
        }

        let columns: Vec<ColumnType> = fields.iter().map(|f| ColumnType::from_header(f)).collect();
        for required in [
            ColumnType::X,
            ColumnType::Y,
            ColumnType::Z,
            ColumnType::NormalX,
            ColumnType::NormalY,
            ColumnType::NormalZ,
        ] {
            if !columns.contains(&required) {
                return Err(Error::Parse {
                    line: line_number,
                    message: format!("header has no '{}' column", required.name()),
                });
            }
        }

        Ok(Self {
            columns,
            has_header: true,
            delimiter,
        })
    }

    fn index_of(&self, column: ColumnType) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    /// Parse one data row
    pub fn parse_line(&self, line: &str, line_number: usize) -> Result<ScanPoint> {
        let fields = self.delimiter.split(line);

        let value = |column: ColumnType| -> Result<Option<f32>> {
            let Some(index) = self.index_of(column) else {
                return Ok(None);
            };
            let Some(field) = fields.get(index).filter(|f| !f.is_empty()) else {
                return Ok(None);
            };
            field.parse::<f32>().map(Some).map_err(|_| Error::Parse {
                line: line_number,
                message: format!("invalid {} value '{}'", column.name(), field),
            })
        };
        let required = |column: ColumnType| -> Result<f32> {
            value(column)?.ok_or_else(|| Error::Parse {
                line: line_number,
                message: format!("missing {} value", column.name()),
            })
        };

        let position = Point3f::new(
            required(ColumnType::X)?,
            required(ColumnType::Y)?,
            required(ColumnType::Z)?,
        );
        let normal = Vector3f::new(
            required(ColumnType::NormalX)?,
            required(ColumnType::NormalY)?,
            required(ColumnType::NormalZ)?,
        );
        let mut point = ScanPoint::new(position, normal);

        if let (Some(r), Some(g), Some(b)) = (
            value(ColumnType::Red)?,
            value(ColumnType::Green)?,
            value(ColumnType::Blue)?,
        ) {
            let color = Vector3f::new(r, g, b);
            // 8-bit channels are rescaled to [0, 1]
            let color = if color.max() > 1.0 { color / 255.0 } else { color };
            point = point.with_color(color);
        }
        if let Some(confidence) = value(ColumnType::Confidence)? {
            point = point.with_confidence(confidence);
        }

        Ok(point)
    }
}

fn is_skipped(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Parse samples from any buffered text source
pub fn parse_scan_points<R: BufRead>(reader: R) -> Result<ScanCloud> {
    let mut cloud = ScanCloud::new();
    let mut schema: Option<XyzSchema> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        if is_skipped(&line) {
            continue;
        }

        if schema.is_none() {
            let detected = XyzSchema::detect(&line, line_number)?;
            let has_header = detected.has_header;
            schema = Some(detected);
            if has_header {
                continue;
            }
        }
        if let Some(layout) = &schema {
            cloud.push(layout.parse_line(&line, line_number)?);
        }
    }

    debug!(points = cloud.len(), schema = ?schema, "parsed scan points");
    Ok(cloud)
}

/// Read samples from a delimited text file
pub fn read_scan_points<P: AsRef<Path>>(path: P) -> Result<ScanCloud> {
    let file = File::open(path.as_ref())?;
    parse_scan_points(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    #[test]
    fn test_delimiter_detection() {
        assert_eq!(Delimiter::detect_from_line("1.0 2.0 3.0"), Delimiter::Whitespace);
        assert_eq!(Delimiter::detect_from_line("1.0,2.0,3.0"), Delimiter::Comma);
        assert_eq!(Delimiter::detect_from_line("1.0\t2.0\t3.0"), Delimiter::Tab);
        assert_eq!(Delimiter::detect_from_line("1.0;2.0;3.0"), Delimiter::Semicolon);
        assert_eq!(
            Delimiter::Whitespace.split("  1.0   2.0 3.0 "),
            vec!["1.0", "2.0", "3.0"]
        );
    }

    #[test]
    fn test_column_type_aliases() {
        assert_eq!(ColumnType::from_header("X"), ColumnType::X);
        assert_eq!(ColumnType::from_header(" normal_y "), ColumnType::NormalY);
        assert_eq!(ColumnType::from_header("red"), ColumnType::Red);
        assert_eq!(ColumnType::from_header("confidence"), ColumnType::Confidence);
        assert_eq!(ColumnType::from_header("intensity"), ColumnType::Unknown);
    }

    #[test]
    fn test_headerless_default_layout() {
        let text = "# captured samples\n\n0 0 0 0 0 1\n1.5 2 -3 0 1 0\n";
        let cloud = parse_scan_points(Cursor::new(text)).unwrap();

        assert_eq!(cloud.len(), 2);
        assert_relative_eq!(cloud[1].position, Point3f::new(1.5, 2.0, -3.0));
        assert_relative_eq!(cloud[1].normal, Vector3f::y());
        assert!(cloud[1].color.is_none());
        assert!(cloud[1].confidence.is_none());
    }

    #[test]
    fn test_header_with_color_and_confidence() {
        let text = "x,y,z,nx,ny,nz,r,g,b,confidence\n\
                    0.1,0.2,0.3,0,0,1,255,0,51,2\n\
                    0.4,0.5,0.6,1,0,0,0.5,0.25,1.0,1\n";
        let cloud = parse_scan_points(Cursor::new(text)).unwrap();

        assert_eq!(cloud.len(), 2);
        assert_relative_eq!(cloud[0].color.unwrap(), Vector3f::new(1.0, 0.0, 0.2), epsilon = 1e-6);
        assert_eq!(cloud[0].confidence, Some(2.0));
        assert_relative_eq!(cloud[1].color.unwrap(), Vector3f::new(0.5, 0.25, 1.0));
        assert_eq!(cloud[1].confidence, Some(1.0));
    }

    #[test]
    fn test_header_columns_in_any_order() {
        let text = "nz ny nx z y x\n1 0 0 3 2 1\n";
        let cloud = parse_scan_points(Cursor::new(text)).unwrap();

        assert_relative_eq!(cloud[0].position, Point3f::new(1.0, 2.0, 3.0));
        assert_relative_eq!(cloud[0].normal, Vector3f::z());
    }

    #[test]
    fn test_missing_coordinate_names_line() {
        let text = "0 0 0 0 0 1\n\n1 2\n";
        match parse_scan_points(Cursor::new(text)) {
            Err(Error::Parse { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains('z'), "{}", message);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_number_and_bad_header() {
        let text = "0 0 0 0 0 1\n0 zero 0 0 0 1\n";
        assert!(matches!(
            parse_scan_points(Cursor::new(text)),
            Err(Error::Parse { line: 2, .. })
        ));

        let text = "x y z\n0 0 0\n";
        assert!(matches!(
            parse_scan_points(Cursor::new(text)),
            Err(Error::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_empty_input() {
        let cloud = parse_scan_points(Cursor::new("# nothing here\n")).unwrap();
        assert!(cloud.is_empty());
    }
}
