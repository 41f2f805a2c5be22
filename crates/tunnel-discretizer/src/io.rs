//! Text formats for spheres and disks.

use std::io::{BufRead, BufReader, Read, Write};

use tunnel_kernel_geom::{Disk, Sphere};
use tunnel_kernel_math::{Point3, Vec3};

use crate::error::{DiscretizeError, Result};

/// Read spheres from PDB `ATOM` records.
///
/// Fields are whitespace separated; fields 6, 7 and 8 (0-based) hold the
/// center and field 9 the radius. Lines that are not `ATOM` records are
/// skipped.
pub fn read_pdb_spheres<R: Read>(reader: R) -> Result<Vec<Sphere>> {
    let mut spheres = Vec::new();
    for (i, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() != Some(&"ATOM") {
            continue;
        }
        if fields.len() < 10 {
            return Err(DiscretizeError::Parse {
                line: i + 1,
                message: format!("ATOM record has {} fields, expected at least 10", fields.len()),
            });
        }
        let v = parse_numbers(&fields[6..10], i + 1)?;
        spheres.push(Sphere::new(Point3::new(v[0], v[1], v[2]), v[3]));
    }
    log::debug!("read {} spheres from PDB records", spheres.len());
    Ok(spheres)
}

/// Read spheres from `x y z r` rows.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn read_sphere_table<R: Read>(reader: R) -> Result<Vec<Sphere>> {
    read_rows(reader, 4)?
        .into_iter()
        .map(|(_, v)| Ok(Sphere::new(Point3::new(v[0], v[1], v[2]), v[3])))
        .collect()
}

/// Write disks one per line as `cx cy cz nx ny nz r`.
pub fn write_disks<W: Write>(mut writer: W, disks: &[Disk]) -> Result<()> {
    for d in disks {
        writeln!(
            writer,
            "{} {} {} {} {} {} {}",
            d.center.x, d.center.y, d.center.z, d.normal.x, d.normal.y, d.normal.z, d.radius
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Read disks written by [`write_disks`].
pub fn read_disks<R: Read>(reader: R) -> Result<Vec<Disk>> {
    read_rows(reader, 7)?
        .into_iter()
        .map(|(line, v)| {
            Disk::new(
                Point3::new(v[0], v[1], v[2]),
                Vec3::new(v[3], v[4], v[5]),
                v[6],
            )
            .map_err(|e| DiscretizeError::Parse {
                line,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Data rows with their 1-based line numbers; blank and `#` lines are skipped.
fn read_rows<R: Read>(reader: R, width: usize) -> Result<Vec<(usize, Vec<f64>)>> {
    let mut rows = Vec::new();
    for (i, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != width {
            return Err(DiscretizeError::Parse {
                line: i + 1,
                message: format!("expected {width} values, found {}", fields.len()),
            });
        }
        rows.push((i + 1, parse_numbers(&fields, i + 1)?));
    }
    Ok(rows)
}

fn parse_numbers(fields: &[&str], line: usize) -> Result<Vec<f64>> {
    fields
        .iter()
        .map(|f| {
            f.parse::<f64>().map_err(|e| DiscretizeError::Parse {
                line,
                message: format!("{f:?}: {e}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDB: &str = "\
REMARK tunnel profile
ATOM      1  H   FIL T   1      12.150  13.458  36.519  1.84  0.00
ATOM      2  H   FIL T   1      12.277  13.679  36.213  1.83  0.50
HETATM    3  O   HOH W   2       1.000   2.000   3.000  1.00
END
";

    #[test]
    fn test_read_pdb_spheres() {
        let spheres = read_pdb_spheres(PDB.as_bytes()).unwrap();
        assert_eq!(spheres.len(), 2);
        assert!((spheres[0].center.x - 12.150).abs() < 1e-12);
        assert!((spheres[0].center.z - 36.519).abs() < 1e-12);
        assert!((spheres[1].radius - 1.83).abs() < 1e-12);
    }

    #[test]
    fn test_read_pdb_rejects_bad_number() {
        let bad = "ATOM 1 H FIL T 1 1.0 2.0 x 1.0\n";
        let err = read_pdb_spheres(bad.as_bytes());
        assert!(matches!(err, Err(DiscretizeError::Parse { line: 1, .. })));
        let short = "REMARK\nATOM 1 H FIL\n";
        assert!(matches!(
            read_pdb_spheres(short.as_bytes()),
            Err(DiscretizeError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_read_sphere_table() {
        let text = "# x y z r\n0 0 0 2\n\n2.5 0 0 2\n";
        let spheres = read_sphere_table(text.as_bytes()).unwrap();
        assert_eq!(spheres.len(), 2);
        assert!((spheres[1].center.x - 2.5).abs() < 1e-12);
        assert!(read_sphere_table("0 0 0\n".as_bytes()).is_err());
    }

    #[test]
    fn test_disk_lines() {
        let disks = vec![
            Disk::new(Point3::new(0.0, 1.0, 2.0), Vec3::x(), 1.5).unwrap(),
            Disk::new(Point3::new(0.25, 1.0, 2.0), Vec3::new(0.6, 0.8, 0.0), 1.25).unwrap(),
        ];
        let mut out = Vec::new();
        write_disks(&mut out, &disks).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().next(), Some("0 1 2 1 0 0 1.5"));

        let back = read_disks(text.as_bytes()).unwrap();
        assert_eq!(back.len(), 2);
        assert!((back[1].normal.y - 0.8).abs() < 1e-12);
        assert!((back[1].radius - 1.25).abs() < 1e-12);

        assert!(read_disks("0 0 0 0 0 0 1\n".as_bytes()).is_err());
    }

    #[test]
    fn test_read_disks_reports_file_line() {
        let text = "# cx cy cz nx ny nz r\n\n0 0 0 1 0 0 1\n# zero normal below\n0.5 0 0 0 0 0 1\n";
        assert!(matches!(
            read_disks(text.as_bytes()),
            Err(DiscretizeError::Parse { line: 5, .. })
        ));
        let short = "# header\n\n0 0 0 1 0 0\n";
        assert!(matches!(
            read_disks(short.as_bytes()),
            Err(DiscretizeError::Parse { line: 3, .. })
        ));
    }
}
