//! Tile naming for the tiled elevation sources.
//!
//! # GLS
//!
//! GLS tiles follow the naming convention `{n|s}{lat}{e|w}{lon}` where the
//! coordinates are the **lower-left corner** of a 1° × 1° tile:
//!
//! - Latitude: 2 digits with n/s prefix (e.g., n47, s05)
//! - Longitude: 3 digits with e/w prefix (e.g., w118, e007)
//!
//! # GTOPO30
//!
//! GTOPO30 tiles are named `{e|w}{lon}{n|s}{lat}` from their **upper-left
//! corner**. North of 60°S the tiles are 40° wide and 50° tall; the
//! Antarctic row is made of 60° wide tiles.

use std::collections::BTreeSet;

use crate::geo::{longitude_norm, BoundingBox, NORTH_LATITUDE_LIMIT, SOUTH_LATITUDE_LIMIT};

/// Upper edges of the GTOPO30 tile rows.
const GTOPO30_LAT_LOCATIONS: [f64; 4] = [90.0, 40.0, -10.0, -60.0];

/// Left edges of the GTOPO30 tiles north of the cutoff latitude.
const GTOPO30_NORTH_LON_LOCATIONS: [f64; 9] =
    [-180.0, -140.0, -100.0, -60.0, -20.0, 20.0, 60.0, 100.0, 140.0];

/// Left edges of the Antarctic GTOPO30 tiles.
const GTOPO30_SOUTH_LON_LOCATIONS: [f64; 6] = [-180.0, -120.0, -60.0, 0.0, 60.0, 120.0];

/// Tiles whose upper edge is at or below this latitude use the south set.
const GTOPO30_TILE_SET_CUTOFF_LATITUDE: f64 = -60.0;

/// Convert a lower-left corner to a GLS tile name.
///
/// # Examples
///
/// ```
/// use espa_elevation::tiles::gls_tile_name;
///
/// assert_eq!(gls_tile_name(47, -118), "n47w118");
/// assert_eq!(gls_tile_name(-5, 7), "s05e007");
/// assert_eq!(gls_tile_name(0, 0), "n00e000");
/// ```
pub fn gls_tile_name(lat: i32, lon: i32) -> String {
    let n_s = if lat < 0 { 's' } else { 'n' };
    let e_w = if lon < 0 { 'w' } else { 'e' };
    format!("{}{:02}{}{:03}", n_s, lat.abs(), e_w, lon.abs())
}

/// Parse a GLS tile name to extract its lower-left corner.
///
/// Accepts an optional directory and extension.
///
/// # Examples
///
/// ```
/// use espa_elevation::tiles::parse_gls_tile_name;
///
/// assert_eq!(parse_gls_tile_name("n47w118.bil"), Some((47, -118)));
/// assert_eq!(parse_gls_tile_name("/data/gls/s05e007"), Some((-5, 7)));
/// assert_eq!(parse_gls_tile_name("w140n90"), None);
/// ```
pub fn parse_gls_tile_name(name: &str) -> Option<(i32, i32)> {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let name = name.split('.').next().unwrap_or(name);

    if name.len() != 7 || !name.is_ascii() {
        return None;
    }

    let lat_sign = match &name[0..1] {
        "n" | "N" => 1,
        "s" | "S" => -1,
        _ => return None,
    };
    let lat: i32 = name[1..3].parse().ok()?;

    let lon_sign = match &name[3..4] {
        "e" | "E" => 1,
        "w" | "W" => -1,
        _ => return None,
    };
    let lon: i32 = name[4..7].parse().ok()?;

    Some((lat * lat_sign, lon * lon_sign))
}

/// Longitudes of the GLS tile columns for a bounding box.
///
/// When the box wraps the antimeridian the columns run from the western
/// edge to 179 and continue from -180 to the eastern edge. There are no
/// e180 GLS tiles.
pub fn gls_longitudes(bbox: &BoundingBox) -> Vec<i32> {
    let start = bbox.west.floor() as i32;
    let end = bbox.east.floor() as i32;

    if bbox.crosses_antimeridian() {
        (start..=179).chain(-180..=end).collect()
    } else {
        (start..=end).collect()
    }
}

/// Names of every GLS tile intersecting the bounding box, south to north.
///
/// # Examples
///
/// ```
/// use espa_elevation::geo::BoundingBox;
/// use espa_elevation::tiles::gls_tiles;
///
/// let bbox = BoundingBox::new(45.3, 44.7, -110.2, -111.4);
/// assert_eq!(
///     gls_tiles(&bbox),
///     vec!["n44w112", "n44w111", "n45w112", "n45w111"]
/// );
/// ```
pub fn gls_tiles(bbox: &BoundingBox) -> Vec<String> {
    let north = bbox.north.floor() as i32;
    let south = bbox.south.floor() as i32;
    let longitudes = gls_longitudes(bbox);

    (south..=north)
        .flat_map(|lat| longitudes.iter().map(move |&lon| gls_tile_name(lat, lon)))
        .collect()
}

/// Convert an upper-left corner to a GTOPO30 tile name.
///
/// # Examples
///
/// ```
/// use espa_elevation::tiles::gtopo30_tile_name;
///
/// assert_eq!(gtopo30_tile_name(90.0, -140.0), "w140n90");
/// assert_eq!(gtopo30_tile_name(-10.0, 20.0), "e020s10");
/// assert_eq!(gtopo30_tile_name(-60.0, 0.0), "w000s60");
/// ```
pub fn gtopo30_tile_name(lat: f64, lon: f64) -> String {
    let e_w = if lon <= 0.0 { 'w' } else { 'e' };
    let n_s = if lat < 0.0 { 's' } else { 'n' };
    format!(
        "{}{:03}{}{:02}",
        e_w,
        lon.abs() as i32,
        n_s,
        lat.abs() as i32
    )
}

/// Upper edge of the GTOPO30 row containing `lat`.
fn gtopo30_row_top(lat: f64) -> f64 {
    GTOPO30_LAT_LOCATIONS
        .iter()
        .copied()
        .filter(|&top| lat < top)
        .fold(None, |acc: Option<f64>, top| {
            Some(acc.map_or(top, |a| a.min(top)))
        })
        .unwrap_or(NORTH_LATITUDE_LIMIT)
}

/// Left edge of the GTOPO30 column containing `lon` in the given row.
fn gtopo30_column_left(row_top: f64, lon: f64) -> f64 {
    let locations: &[f64] = if row_top > GTOPO30_TILE_SET_CUTOFF_LATITUDE {
        &GTOPO30_NORTH_LON_LOCATIONS
    } else {
        &GTOPO30_SOUTH_LON_LOCATIONS
    };

    locations
        .iter()
        .copied()
        .filter(|&left| lon > left)
        .fold(None, |acc: Option<f64>, left| {
            Some(acc.map_or(left, |a| a.max(left)))
        })
        .unwrap_or(-180.0)
}

/// Names of the GTOPO30 tiles covering the bounding box.
///
/// The tiles do not always reach their nominal boundary (w100n90 stops at
/// -99.995833°), so the box is grown by `padding` degrees on every side;
/// longitudes wrap and latitudes are clamped to the poles. The result is
/// sorted and free of duplicates.
///
/// # Examples
///
/// ```
/// use espa_elevation::geo::BoundingBox;
/// use espa_elevation::tiles::gtopo30_tiles;
///
/// let bbox = BoundingBox::new(45.0, 44.0, -110.0, -111.0);
/// assert_eq!(gtopo30_tiles(&bbox, 1.0), vec!["w140n90"]);
/// ```
pub fn gtopo30_tiles(bbox: &BoundingBox, padding: f64) -> Vec<String> {
    let ul_lon = longitude_norm(bbox.west - padding);
    let lr_lon = longitude_norm(bbox.east + padding);
    let ul_lat = (bbox.north + padding).min(NORTH_LATITUDE_LIMIT);
    let lr_lat = (bbox.south - padding).max(SOUTH_LATITUDE_LIMIT);

    let rows: BTreeSet<i32> = [gtopo30_row_top(ul_lat), gtopo30_row_top(lr_lat)]
        .iter()
        .map(|&top| top as i32)
        .collect();

    let mut tiles = BTreeSet::new();
    for top in rows {
        let top = top as f64;
        for lon in [ul_lon, lr_lon] {
            tiles.insert(gtopo30_tile_name(top, gtopo30_column_left(top, lon)));
        }
    }

    tiles.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gls_names() {
        assert_eq!(gls_tile_name(47, -118), "n47w118");
        assert_eq!(gls_tile_name(-1, -1), "s01w001");
        assert_eq!(gls_tile_name(82, 179), "n82e179");
        assert_eq!(gls_tile_name(-53, -180), "s53w180");
    }

    #[test]
    fn test_parse_gls_names() {
        assert_eq!(parse_gls_tile_name("n47w118"), Some((47, -118)));
        assert_eq!(parse_gls_tile_name("N47W118.BIL"), Some((47, -118)));
        assert_eq!(parse_gls_tile_name("C:\\gls\\s12e077.hdr"), Some((-12, 77)));
        assert_eq!(parse_gls_tile_name("n47w11"), None);
        assert_eq!(parse_gls_tile_name("x47w118"), None);
        assert_eq!(parse_gls_tile_name("n47x118"), None);
        assert_eq!(parse_gls_tile_name("naaw118"), None);
    }

    #[test]
    fn test_gls_name_roundtrip() {
        for (lat, lon) in [(0, 0), (-1, -1), (35, 138), (-60, -180), (82, 179)] {
            assert_eq!(parse_gls_tile_name(&gls_tile_name(lat, lon)), Some((lat, lon)));
        }
    }

    #[test]
    fn test_gls_tiles_single() {
        let bbox = BoundingBox::new(35.9, 35.1, 138.9, 138.1);
        assert_eq!(gls_tiles(&bbox), vec!["n35e138"]);
    }

    #[test]
    fn test_gls_tiles_boundary_is_inclusive() {
        // A box ending exactly on an integer degree pulls in the next tile
        let bbox = BoundingBox::new(36.0, 35.5, 139.0, 138.5);
        assert_eq!(
            gls_tiles(&bbox),
            vec!["n35e138", "n35e139", "n36e138", "n36e139"]
        );
    }

    #[test]
    fn test_gls_tiles_across_antimeridian() {
        let bbox = BoundingBox::new(-16.2, -16.8, -179.4, 178.6);
        assert_eq!(
            gls_longitudes(&bbox),
            vec![178, 179, -180]
        );
        assert_eq!(
            gls_tiles(&bbox),
            vec!["s17e178", "s17e179", "s17w180"]
        );
    }

    #[test]
    fn test_gtopo30_names() {
        assert_eq!(gtopo30_tile_name(90.0, -180.0), "w180n90");
        assert_eq!(gtopo30_tile_name(40.0, 140.0), "e140n40");
        assert_eq!(gtopo30_tile_name(-60.0, 120.0), "e120s60");
    }

    #[test]
    fn test_gtopo30_tiles_span_rows() {
        // 39.5..41.5 with 1 degree padding spans the rows topped at 90 and 40
        let bbox = BoundingBox::new(41.5, 39.5, -101.0, -102.5);
        assert_eq!(gtopo30_tiles(&bbox, 1.0), vec!["w140n40", "w140n90"]);
    }

    #[test]
    fn test_gtopo30_tiles_padding_reaches_next_column() {
        // West edge at -99.5 padded to -100.5 falls in the w140 column
        let bbox = BoundingBox::new(45.0, 44.0, -98.0, -99.5);
        assert_eq!(gtopo30_tiles(&bbox, 1.0), vec!["w100n90", "w140n90"]);
    }

    #[test]
    fn test_gtopo30_tiles_antarctic() {
        let bbox = BoundingBox::new(-75.0, -78.0, 5.0, -5.0);
        assert_eq!(gtopo30_tiles(&bbox, 1.0), vec!["w000s60", "w060s60"]);
    }

    #[test]
    fn test_gtopo30_tiles_near_pole() {
        let bbox = BoundingBox::new(89.5, 88.0, 10.0, 5.0);
        assert_eq!(gtopo30_tiles(&bbox, 1.0), vec!["w020n90"]);
    }

    #[test]
    fn test_gtopo30_tiles_antimeridian() {
        let bbox = BoundingBox::new(-16.0, -17.0, -179.5, 179.5);
        assert_eq!(gtopo30_tiles(&bbox, 1.0), vec!["e140s10", "w180s10"]);
    }
}
