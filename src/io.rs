use std::path::{Path, PathBuf};

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::tables::{ColumnDataType, ColumnDescription, ReadsCol};
use fitsio::FitsFile;
use ndarray::Array2;
use serde::{de::DeserializeOwned, Serialize};
use serde_yaml::Value;

use crate::band_info::Ext;
use crate::staging::write_staged;
use crate::{Result, SimError};

/// read a numeric header keyword
pub fn header_f64(fptr: &mut FitsFile, hdu: &FitsHdu, key: &str, filename: &str) -> Result<f64> {
    hdu.read_key::<f64>(fptr, key).map_err(|e| {
        SimError::InvalidFITS(format!(
            "missing or non-numeric {} in fits header {}: {}",
            key, filename, e
        ))
    })
}

fn open_hdu(fptr: &mut FitsFile, ext: usize, filename: &str) -> Result<FitsHdu> {
    fptr.hdu(ext)
        .map_err(|_| SimError::InvalidFITS(format!("no hdu {} in {}", ext, filename)))
}

/// (rows, cols) of a two dimensional image HDU
fn image_shape(hdu: &FitsHdu, ext: usize, filename: &str) -> Result<(usize, usize)> {
    match &hdu.info {
        HduInfo::ImageInfo { shape, .. } if shape.len() == 2 => Ok((shape[0], shape[1])),
        HduInfo::ImageInfo { shape, .. } => Err(SimError::InvalidFITS(format!(
            "expected a 2d image in hdu {} of {}, got shape {:?}",
            ext, filename, shape
        ))),
        _ => Err(SimError::InvalidFITS(format!(
            "hdu {} of {} is not an image",
            ext, filename
        ))),
    }
}

/// load one image HDU as a (row, col) array
pub fn read_plane<P: AsRef<Path>>(path: P, ext: usize) -> Result<Array2<f64>> {
    let filename = path.as_ref().display().to_string();
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = open_hdu(&mut fptr, ext, &filename)?;
    let shape = image_shape(&hdu, ext, &filename)?;
    let data: Vec<f64> = hdu.read_image(&mut fptr)?;
    Array2::from_shape_vec(shape, data).map_err(|e| {
        SimError::InvalidFITS(format!("cannot shape image data in {}: {}", filename, e))
    })
}

/// load an integer mask plane
pub fn read_mask<P: AsRef<Path>>(path: P, ext: usize) -> Result<Array2<i32>> {
    Ok(read_plane(path, ext)?.mapv(|v| v as i32))
}

/// position of an HDU in a file, looking EXTNAMEs up case-insensitively
pub fn resolve_ext<P: AsRef<Path>>(path: P, ext: &Ext) -> Result<usize> {
    let filename = path.as_ref().display().to_string();
    let mut fptr = FitsFile::open(path.as_ref())?;
    match ext {
        Ext::Index(i) => open_hdu(&mut fptr, *i, &filename).map(|_| *i),
        Ext::Name(name) => {
            let mut i = 0;
            while let Ok(hdu) = fptr.hdu(i) {
                if let Ok(extname) = hdu.read_key::<String>(&mut fptr, "EXTNAME") {
                    if extname.trim().eq_ignore_ascii_case(name) {
                        return Ok(i);
                    }
                }
                i += 1;
            }
            Err(SimError::InvalidFITS(format!(
                "no hdu named {} in {}",
                name, filename
            )))
        }
    }
}

/// Overwrite the pixel data of image HDUs in place, keeping their headers
/// (WCS included) untouched. Every plane must match the stored shape; the
/// shapes are all checked before any pixel is written.
pub fn write_planes_in_place<P: AsRef<Path>>(
    path: P,
    planes: &[(usize, &Array2<f64>)],
) -> Result<()> {
    let filename = path.as_ref().display().to_string();
    let mut fptr = FitsFile::edit(path.as_ref())?;
    let mut hdus = Vec::with_capacity(planes.len());
    for (ext, plane) in planes {
        let hdu = open_hdu(&mut fptr, *ext, &filename)?;
        let stored = image_shape(&hdu, *ext, &filename)?;
        if stored != plane.dim() {
            return Err(SimError::Shape(format!(
                "hdu {} of {} is {:?}, got {:?} plane",
                ext,
                filename,
                stored,
                plane.dim()
            )));
        }
        hdus.push(hdu);
    }
    for (hdu, (_, plane)) in hdus.iter().zip(planes) {
        let data: Vec<f64> = plane.iter().copied().collect();
        hdu.write_image(&mut fptr, &data)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Flatten one serialized value into named scalar cells. Nested structs
/// become `outer_inner` and sequences `name_0`, `name_1`, ...
fn flatten_value(name: &str, value: &Value, out: &mut Vec<(String, Cell)>) -> Result<()> {
    let join = |suffix: &str| {
        if name.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", name, suffix)
        }
    };
    match value {
        Value::Null => out.push((name.to_string(), Cell::Float(f64::NAN))),
        Value::Bool(b) => out.push((name.to_string(), Cell::Int(*b as i64))),
        Value::Number(n) => {
            let cell = match n.as_i64() {
                Some(i) if !n.is_f64() => Cell::Int(i),
                _ => Cell::Float(n.as_f64().unwrap_or(f64::NAN)),
            };
            out.push((name.to_string(), cell));
        }
        Value::String(s) => out.push((name.to_string(), Cell::Text(s.clone()))),
        Value::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_value(&join(&i.to_string()), item, out)?;
            }
        }
        Value::Mapping(map) => {
            for (key, item) in map {
                let key = match key {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    other => {
                        return Err(SimError::Config(format!(
                            "cannot name a table column after {:?}",
                            other
                        )))
                    }
                };
                flatten_value(&join(&key), item, out)?;
            }
        }
        Value::Tagged(tagged) => flatten_value(name, &tagged.value, out)?,
    }
    Ok(())
}

#[derive(Debug)]
enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    fn start(cell: Cell) -> Self {
        match cell {
            Cell::Int(v) => Column::Int(vec![v]),
            Cell::Float(v) => Column::Float(vec![v]),
            Cell::Text(v) => Column::Text(vec![v]),
        }
    }

    fn push(&mut self, cell: Cell) -> std::result::Result<(), Cell> {
        match (self, cell) {
            (Column::Int(col), Cell::Int(v)) => col.push(v),
            (Column::Float(col), Cell::Float(v)) => col.push(v),
            (Column::Float(col), Cell::Int(v)) => col.push(v as f64),
            (Column::Text(col), Cell::Text(v)) => col.push(v),
            (_, cell) => return Err(cell),
        }
        Ok(())
    }
}

/// lay records out as named columns; the first record fixes the layout
fn to_columns<R: Serialize>(records: &[R]) -> Result<Vec<(String, Column)>> {
    let mut columns: Vec<(String, Column)> = vec![];
    for (row, record) in records.iter().enumerate() {
        let mut cells = vec![];
        flatten_value("", &serde_yaml::to_value(record)?, &mut cells)?;
        if row == 0 {
            columns = cells
                .into_iter()
                .map(|(name, cell)| (name, Column::start(cell)))
                .collect();
            continue;
        }
        let names_match = cells.len() == columns.len()
            && cells.iter().zip(&columns).all(|((a, _), (b, _))| a == b);
        if !names_match {
            return Err(SimError::Config(format!(
                "record {} does not have the same fields as the first record",
                row
            )));
        }
        for ((name, cell), (_, column)) in cells.into_iter().zip(columns.iter_mut()) {
            column.push(cell).map_err(|cell| {
                SimError::Config(format!(
                    "record {} has {:?} in column {} of a different type",
                    row, cell, name
                ))
            })?;
        }
    }
    Ok(columns)
}

/// Write records as a FITS binary table in HDU `extname`, replacing any
/// existing file. Array-valued and nested fields are spread over scalar
/// columns. Nothing reaches `path` unless the whole table is written.
pub fn write_results_table<P: AsRef<Path>, R: Serialize>(
    path: P,
    extname: &str,
    records: &[R],
) -> Result<PathBuf> {
    if records.is_empty() {
        return Err(SimError::Config(format!(
            "no records to write to {}",
            path.as_ref().display()
        )));
    }
    let columns = to_columns(records)?;
    let mut descriptions = Vec::with_capacity(columns.len());
    for (name, column) in columns.iter() {
        let (data_type, repeat) = match column {
            Column::Int(_) => (ColumnDataType::Long, 1),
            Column::Float(_) => (ColumnDataType::Double, 1),
            Column::Text(values) => (
                ColumnDataType::Text,
                values.iter().map(|s| s.len()).max().unwrap_or(0).max(1),
            ),
        };
        descriptions.push(
            ColumnDescription::new(name)
                .with_type(data_type)
                .that_repeats(repeat)
                .create()?,
        );
    }
    write_staged(path, |staged| {
        let mut fptr = FitsFile::create(staged).open()?;
        let hdu = fptr.create_table(extname.to_string(), &descriptions)?;
        for (name, column) in columns.iter() {
            match column {
                Column::Int(values) => hdu.write_col(&mut fptr, name, &values[..])?,
                Column::Float(values) => hdu.write_col(&mut fptr, name, &values[..])?,
                Column::Text(values) => hdu.write_col(&mut fptr, name, &values[..])?,
            };
        }
        Ok(())
    })
}

/// read one column of a binary table HDU
pub fn read_column<P: AsRef<Path>, T: ReadsCol>(
    path: P,
    extname: &str,
    column: &str,
) -> Result<Vec<T>> {
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = fptr.hdu(extname)?;
    Ok(hdu.read_col(&mut fptr, column)?)
}

/// write records as a csv table, replacing any existing file
pub fn write_table<P: AsRef<Path>, R: Serialize>(path: P, records: &[R]) -> Result<PathBuf> {
    write_staged(path, |staged| {
        let mut writer = csv::Writer::from_path(staged)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    })
}

pub fn read_table<P: AsRef<Path>, R: DeserializeOwned>(path: P) -> Result<Vec<R>> {
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize()
        .map(|rec| rec.map_err(SimError::from))
        .collect()
}
