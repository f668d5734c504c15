use cldera_utils::Dataset;
use cldera_utils::metadata::{AttributeValue, Attributes};
use cldera_utils::writer::{ArrayData, StoreWriter};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn cldera_utils(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cldera-utils"))
        .args(args)
        .arg("--no-color")
        .output()
        .expect("Failed to execute cldera-utils")
}

fn s(p: &Path) -> &str {
    p.to_str().unwrap()
}

fn dims(names: &[&str]) -> Vec<String> {
    names.iter().map(|d| d.to_string()).collect()
}

fn units(u: &str) -> Attributes {
    let mut a = Attributes::new();
    a.insert("units".to_string(), u.into());
    a
}

/// Helper function to write a hierarchical (non-consolidated) store by hand
fn create_raw_grid(dir: &Path, lat: &[f64], lon: &[f64]) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(".zgroup"), r#"{"zarr_format": 2}"#)?;
    fs::write(dir.join(".zattrs"), r#"{"title": "test grid"}"#)?;

    for (name, values, unit) in [("lat", lat, "degrees_north"), ("lon", lon, "degrees_east")] {
        let var = dir.join(name);
        fs::create_dir_all(&var)?;
        let zarray = format!(
            r#"{{
                "zarr_format": 2,
                "shape": [{n}],
                "chunks": [{n}],
                "dtype": "<f8",
                "compressor": null,
                "fill_value": "NaN",
                "order": "C",
                "filters": null
            }}"#,
            n = values.len()
        );
        fs::write(var.join(".zarray"), zarray)?;
        let zattrs = format!(
            r#"{{"units": "{}", "_ARRAY_DIMENSIONS": ["ncol"]}}"#,
            unit
        );
        fs::write(var.join(".zattrs"), zattrs)?;
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        fs::write(var.join("0"), bytes)?;
    }
    Ok(())
}

fn write_grid(path: &Path, lat: Vec<f64>, lon: Vec<f64>) -> StoreWriter {
    let n = lat.len();
    let mut w = StoreWriter::create(path, false).unwrap();
    w.write_array("lat", &dims(&["ncol"]), &[n], ArrayData::F64(lat), units("degrees_north"))
        .unwrap();
    w.write_array("lon", &dims(&["ncol"]), &[n], ArrayData::F64(lon), units("degrees_east"))
        .unwrap();
    w
}

fn write_mask(path: &Path, name: &str, labels: Vec<i32>) {
    let n = labels.len();
    let mut w = StoreWriter::create(path, false).unwrap();
    w.write_array(name, &dims(&["ncol"]), &[n], ArrayData::I32(labels), Attributes::new())
        .unwrap();
    w.finish().unwrap();
}

/// Two hemispheres split at the prime meridian
const HEMISPHERES: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"Name": "West", "Acronym": "W", "number": 1},
         "geometry": {"type": "Polygon", "coordinates": [[[-180, -90], [0, -90], [0, 90], [-180, 90], [-180, -90]]]}},
        {"type": "Feature", "properties": {"Name": "East", "Acronym": "E", "number": 2},
         "geometry": {"type": "Polygon", "coordinates": [[[0, -90], [180, -90], [180, 90], [0, 90], [0, -90]]]}}
    ]
}"#;

/// Only the northern half of the globe
const NORTH_ONLY: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"Name": "North", "number": 0},
         "geometry": {"type": "Polygon", "coordinates": [[[-180, 0], [180, 0], [180, 90], [-180, 90], [-180, 0]]]}}
    ]
}"#;

fn assert_pass(output: &Output) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "command failed:\nstdout: {}\nstderr: {}",
        stdout,
        stderr
    );
    assert!(stdout.contains("OVERALL STATUS: PASS"), "Missing status line");
}

fn assert_fail(output: &Output) -> String {
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("OVERALL STATUS: FAIL"), "Missing status line");
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn staging_leftovers(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with(".cldera-staging"))
        .collect()
}

#[tokio::test]
async fn test_zonal_masks_from_hierarchical_store() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("grid.zarr");
    let output = temp_dir.path().join("zonal.zarr");
    create_raw_grid(&input, &[-80.0, -30.0, 0.0, 30.0, 80.0], &[0.0, 90.0, 180.0, 270.0, 359.0])
        .expect("Failed to create grid");

    let out = cldera_utils(&["zonal-masks", "-i", s(&input), "-m", s(&output)]);
    assert_pass(&out);

    let ds = Dataset::open(&output).await.unwrap();
    let mask = ds.variable("mask").unwrap();
    assert_eq!(mask.array.dtype, "<i4");
    assert_eq!(mask.dims, vec!["ncol"]);
    assert_eq!(
        mask.attribute("scheme").and_then(AttributeValue::as_str),
        Some("zonal")
    );
    assert_eq!(ds.read_field("mask").unwrap().data(), &[0.0, 2.0, 3.0, 4.0, 6.0]);
    // Coordinates are stored as they were read.
    assert_eq!(ds.read_field("lon").unwrap().data()[4], 359.0);
}

#[test]
fn test_existing_output_requires_overwrite() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("grid.zarr");
    let output = temp_dir.path().join("global.zarr");
    create_raw_grid(&input, &[10.0, 20.0], &[0.0, 1.0]).unwrap();

    assert_pass(&cldera_utils(&["global-mask", "-i", s(&input), "-m", s(&output)]));

    let stderr = assert_fail(&cldera_utils(&["global-mask", "-i", s(&input), "-m", s(&output)]));
    assert!(stderr.contains("already exists"), "stderr: {}", stderr);

    assert_pass(&cldera_utils(&["global-mask", "-i", s(&input), "-m", s(&output), "-o"]));
    assert!(staging_leftovers(temp_dir.path()).is_empty());
}

#[test]
fn test_output_path_that_is_not_a_store_is_refused() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("grid.zarr");
    create_raw_grid(&input, &[10.0], &[0.0]).unwrap();

    let file = temp_dir.path().join("notes.txt");
    fs::write(&file, "keep me").unwrap();
    let stderr = assert_fail(&cldera_utils(&["zonal-masks", "-i", s(&input), "-m", s(&file), "-o"]));
    assert!(stderr.contains("existing file"), "stderr: {}", stderr);
    assert_eq!(fs::read_to_string(&file).unwrap(), "keep me");

    let dir = temp_dir.path().join("plain_dir");
    fs::create_dir(&dir).unwrap();
    let stderr = assert_fail(&cldera_utils(&["zonal-masks", "-i", s(&input), "-m", s(&dir), "-o"]));
    assert!(stderr.contains("not a Zarr store"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_ipcc_masks_boundary_and_pole_columns() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("grid.zarr");
    let output = temp_dir.path().join("ar6.zarr");
    let regions = temp_dir.path().join("regions.geojson");
    fs::write(&regions, HEMISPHERES).unwrap();
    // The middle column sits on the shared edge and lands east after the nudge.
    // The last one is the north pole, which both hemispheres reach; West is listed first.
    write_grid(&input, vec![10.0, 10.0, 10.0, 90.0], vec![-90.0, 0.0, 90.0, 0.0])
        .finish()
        .unwrap();

    let out = cldera_utils(&[
        "ipcc-masks",
        "-i",
        s(&input),
        "-m",
        s(&output),
        "--regions",
        s(&regions),
    ]);
    assert_pass(&out);

    let ds = Dataset::open(&output).await.unwrap();
    let mask = ds.variable("mask").unwrap();
    assert_eq!(mask.array.dtype, "<f8");
    assert_eq!(ds.read_field("mask").unwrap().data(), &[1.0, 2.0, 2.0, 1.0]);
    assert_eq!(
        mask.attribute("region_names"),
        Some(&AttributeValue::Array(vec!["West".into(), "East".into()]))
    );
}

#[test]
fn test_ipcc_masks_unclassifiable_point_is_fatal() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("grid.zarr");
    let output = temp_dir.path().join("ar6.zarr");
    let regions = temp_dir.path().join("north.geojson");
    fs::write(&regions, NORTH_ONLY).unwrap();
    write_grid(&input, vec![45.0, -30.0], vec![10.0, 20.0])
        .finish()
        .unwrap();

    let out = cldera_utils(&[
        "ipcc-masks",
        "-i",
        s(&input),
        "-m",
        s(&output),
        "--regions",
        s(&regions),
    ]);
    let stderr = assert_fail(&out);
    assert!(stderr.contains("lat = -30"), "stderr: {}", stderr);
    assert!(!output.exists(), "no partial mask may be written");
    assert!(staging_leftovers(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn test_region_mean_spans_every_label() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("h0.zarr");
    let mask = temp_dir.path().join("mask.zarr");
    let output = temp_dir.path().join("means.zarr");

    write_mask(&mask, "mask", vec![0, 2, 2, 0]);
    let mut w = write_grid(&input, vec![0.0; 4], vec![0.0, 90.0, 180.0, 270.0]);
    w.write_array("area", &dims(&["ncol"]), &[4], ArrayData::F64(vec![1.0, 1.0, 2.0, 2.0]), Attributes::new())
        .unwrap();
    w.write_array("time", &dims(&["time"]), &[2], ArrayData::F64(vec![0.0, 1.0]), units("days"))
        .unwrap();
    w.write_array(
        "TS",
        &dims(&["time", "ncol"]),
        &[2, 4],
        ArrayData::F64(vec![1.0, 2.0, 3.0, 4.0, 10.0, 10.0, 10.0, 10.0]),
        units("K"),
    )
    .unwrap();
    w.finish().unwrap();

    let out = cldera_utils(&["region-mean", "-i", s(&input), "-m", s(&mask), "-o", s(&output)]);
    assert_pass(&out);

    let ds = Dataset::open(&output).await.unwrap();
    assert!(!ds.has_variable("lat"));
    assert_eq!(ds.dimension_size("nreg").unwrap(), Some(3));
    let ts = ds.read_field("TS").unwrap();
    assert_eq!(ts.dims(), &["time".to_string(), "nreg".to_string()]);
    let v = ts.data();
    assert!((v[0] - 3.0).abs() < 1e-12);
    assert!(v[1].is_nan(), "region 1 has no columns");
    assert!((v[2] - 8.0 / 3.0).abs() < 1e-12);
    assert_eq!(v[3], 10.0);
    assert!(v[4].is_nan());
    assert_eq!(v[5], 10.0);
    assert_eq!(
        ds.variable("TS").unwrap().attribute("units").and_then(AttributeValue::as_str),
        Some("K")
    );
    assert_eq!(ds.read_field("time").unwrap().data(), &[0.0, 1.0]);

    let area = ds.read_field("region_area").unwrap();
    assert_eq!(area.data()[0], 3.0);
    assert!(area.data()[1].is_nan());

    // The integral mode keeps the raw weighted sums.
    let sums = temp_dir.path().join("sums.zarr");
    let out = cldera_utils(&[
        "region-mean", "-i", s(&input), "-m", s(&mask), "-o", s(&sums), "--mode", "integral",
    ]);
    assert_pass(&out);
    let ds = Dataset::open(&sums).await.unwrap();
    let ts = ds.read_field("TS").unwrap();
    assert_eq!(&ts.data()[..1], &[9.0]);
    assert_eq!(ts.data()[2], 8.0);
}

#[tokio::test]
async fn test_region_mean_bounded_with_level_contraction() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("h0.zarr");
    let mask = temp_dir.path().join("mask.zarr");
    let output = temp_dir.path().join("means.zarr");

    write_mask(&mask, "mask", vec![0, 0, 0]);
    let mut w = write_grid(&input, vec![0.0; 3], vec![0.0, 1.0, 2.0]);
    w.write_array("area_mean", &dims(&["ncol"]), &[3], ArrayData::F64(vec![1.0; 3]), Attributes::new())
        .unwrap();
    w.write_array(
        "AODVIS",
        &dims(&["ncol"]),
        &[3],
        ArrayData::F64(vec![0.5, 2.0e10, 0.8]),
        Attributes::new(),
    )
    .unwrap();
    w.write_array(
        "T",
        &dims(&["lev", "ncol"]),
        &[2, 3],
        ArrayData::F64(vec![4.0, 4.0, 4.0, 6.0, 6.0, 6.0]),
        Attributes::new(),
    )
    .unwrap();
    w.write_array("pdel", &dims(&["lev", "ncol"]), &[2, 3], ArrayData::F64(vec![1.0; 6]), Attributes::new())
        .unwrap();
    w.finish().unwrap();

    let out = cldera_utils(&[
        "region-mean",
        "-i",
        s(&input),
        "-m",
        s(&mask),
        "-o",
        s(&output),
        "--valid-bounds",
        "0,1e10",
        "--level-bounds",
        "0,1",
        "--level-weight",
        "pdel",
    ]);
    assert_pass(&out);

    let ds = Dataset::open(&output).await.unwrap();
    let aod = ds.read_field("AODVIS").unwrap();
    assert!((aod.data()[0] - 0.65).abs() < 1e-12);
    let t = ds.read_field("T").unwrap();
    assert_eq!(t.dims(), &["nreg".to_string()]);
    assert_eq!(t.data(), &[10.0]);
    assert!(!ds.has_variable("pdel"));
    assert!(ds.has_variable("region_area_mean"));
}

#[test]
fn test_region_mean_without_weight_is_a_usage_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("h0.zarr");
    let mask = temp_dir.path().join("mask.zarr");
    let output = temp_dir.path().join("means.zarr");
    write_mask(&mask, "mask", vec![0, 1]);
    write_grid(&input, vec![0.0; 2], vec![0.0, 1.0]).finish().unwrap();

    let stderr = assert_fail(&cldera_utils(&[
        "region-mean", "-i", s(&input), "-m", s(&mask), "-o", s(&output),
    ]));
    assert!(stderr.contains("--weight"), "stderr: {}", stderr);
    assert!(!output.exists());
}

fn write_member(dir: &Path, n: usize, ts: Vec<f64>, with_ps: bool) {
    let mut w = StoreWriter::create(dir.join(format!("run.{:02}.zarr", n)), false).unwrap();
    w.write_array("time", &dims(&["time"]), &[1], ArrayData::F64(vec![31.0]), units("days"))
        .unwrap();
    w.write_array("TS", &dims(&["time", "ncol"]), &[1, 2], ArrayData::F64(ts), units("K"))
        .unwrap();
    if with_ps {
        w.write_array("PS", &dims(&["ncol"]), &[2], ArrayData::F64(vec![1.0e5; 2]), Attributes::new())
            .unwrap();
    }
    w.finish().unwrap();
}

#[tokio::test]
async fn test_ensemble_mean_std() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    write_member(temp_dir.path(), 1, vec![1.0, 5.0], true);
    write_member(temp_dir.path(), 2, vec![2.0, 5.0], true);
    write_member(temp_dir.path(), 3, vec![6.0, 5.0], true);
    let template = temp_dir.path().join("run.#.zarr");
    let output = temp_dir.path().join("ens.zarr");

    let out = cldera_utils(&[
        "ensemble-mean-std",
        "-f",
        s(&template),
        "-n",
        "3",
        "-w",
        "2",
        "-o",
        s(&output),
        "-e",
        "PS",
    ]);
    assert_pass(&out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("updating means with ens member"));

    let ds = Dataset::open(&output).await.unwrap();
    assert!(!ds.has_variable("PS_mean"));
    assert_eq!(ds.read_field("TS_mean").unwrap().data(), &[3.0, 5.0]);
    let std = ds.read_field("TS_std").unwrap();
    assert!((std.data()[0] - 7.0f64.sqrt()).abs() < 1e-12);
    assert_eq!(std.data()[1], 0.0);
    assert_eq!(ds.read_field("time").unwrap().data(), &[31.0]);
}

#[test]
fn test_ensemble_member_missing_variable() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    write_member(temp_dir.path(), 1, vec![1.0, 1.0], true);
    write_member(temp_dir.path(), 2, vec![1.0, 1.0], false);
    let template = temp_dir.path().join("run.#.zarr");
    let output = temp_dir.path().join("ens.zarr");

    let stderr = assert_fail(&cldera_utils(&[
        "ensemble-mean-std",
        "-f",
        s(&template),
        "-n",
        "2",
        "-w",
        "2",
        "-o",
        s(&output),
    ]));
    assert!(stderr.contains("run.02.zarr"), "stderr: {}", stderr);
    assert!(stderr.contains("'PS'"), "stderr: {}", stderr);
    assert!(!output.exists());
}

#[tokio::test]
async fn test_generate_config_then_compute_stats() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let masks = temp_dir.path().join("masks");
    fs::create_dir(&masks).unwrap();
    write_mask(&masks.join("global.ne30.nc"), "mask_glb", vec![0; 4]);
    write_mask(&masks.join("zonal.regions.ne30.nc"), "mask_znl", vec![1, 3, 3, 5]);
    write_mask(&masks.join("ar6.regions.ne30.nc"), "mask_ar6", vec![0, 5, 5, 7]);

    let nlev = 72;
    let input = temp_dir.path().join("h0.zarr");
    let mut w = write_grid(&input, vec![0.0; 4], vec![0.0, 90.0, 180.0, 270.0]);
    w.write_array("area", &dims(&["ncol"]), &[4], ArrayData::F64(vec![1.0; 4]), Attributes::new())
        .unwrap();
    // T equals the level index in every column.
    w.write_array(
        "T",
        &dims(&["time", "lev", "ncol"]),
        &[1, nlev, 4],
        ArrayData::F64((0..nlev * 4).map(|i| (i / 4) as f64).collect()),
        Attributes::new(),
    )
    .unwrap();
    w.write_array(
        "pdel",
        &dims(&["time", "lev", "ncol"]),
        &[1, nlev, 4],
        ArrayData::F64(vec![1.0; nlev * 4]),
        Attributes::new(),
    )
    .unwrap();
    w.write_array(
        "TS",
        &dims(&["time", "ncol"]),
        &[1, 4],
        ArrayData::F64(vec![1.0, 2.0, 4.0, 8.0]),
        Attributes::new(),
    )
    .unwrap();
    w.write_array(
        "AODVIS",
        &dims(&["time", "ncol"]),
        &[1, 4],
        ArrayData::F64(vec![0.2, 1.0e36, 0.4, 0.6]),
        Attributes::new(),
    )
    .unwrap();
    w.finish().unwrap();

    let config = temp_dir.path().join("cldera_profiling_config.yaml");
    let out = cldera_utils(&[
        "generate-config",
        "-o",
        s(&config),
        "--mask-location",
        s(&masks),
        "--vars3d",
        "T",
        "--vars2d",
        "TS,QFLX",
        "--vars2d-bounded",
        "AODVIS",
    ]);
    assert_pass(&out);
    let text = fs::read_to_string(&config).unwrap();
    assert!(text.starts_with("%YAML 1.1\n---\n"));
    assert!(text.contains("T_znl_ltropo"));

    let output = temp_dir.path().join("stats.zarr");
    let out = cldera_utils(&["compute-stats", "-c", s(&config), "-i", s(&input), "-o", s(&output)]);
    assert_pass(&out);

    let ds = Dataset::open(&output).await.unwrap();
    // QFLX is tracked but not in the input.
    assert!(!ds.has_variable("QFLX_glb"));

    let t = ds.read_field("T_znl_ltropo").unwrap();
    assert_eq!(t.dims(), &["time".to_string(), "dim3".to_string()]);
    // Level contractions are pdel-weighted means over levels 54..=71.
    assert_eq!(t.data(), &[62.5, 62.5, 62.5]);
    assert_eq!(ds.read_field("T_glb").unwrap().data(), &[35.5]);
    assert_eq!(ds.read_field("T_ar6_53").unwrap().data(), &[19.0, 19.0, 19.0]);

    // Dense regions in ascending label order: 0 -> col 0, 5 -> cols 1-2, 7 -> col 3.
    assert_eq!(ds.read_field("TS_ar6").unwrap().data(), &[1.0, 3.0, 8.0]);
    assert_eq!(ds.read_field("TS_glb").unwrap().data(), &[3.75]);

    let aod = ds.read_field("AODVIS_glb").unwrap();
    assert!((aod.data()[0] - 0.4).abs() < 1e-12);
    assert_eq!(ds.read_field("AODVIS_znl").unwrap().data()[0], 0.2);
}

#[test]
fn test_generate_config_refuses_to_replace_without_overwrite() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = temp_dir.path().join("config.yaml");
    fs::write(&config, "keep").unwrap();

    assert_fail(&cldera_utils(&["generate-config", "-o", s(&config)]));
    assert_eq!(fs::read_to_string(&config).unwrap(), "keep");

    assert_pass(&cldera_utils(&["generate-config", "-o", s(&config), "-O"]));
    assert!(fs::read_to_string(&config).unwrap().contains("Fields To Track"));
}

#[test]
fn test_cli_color_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = temp_dir.path().join("config.yaml");

    // Run without --no-color flag
    let output = Command::new(env!("CARGO_BIN_EXE_cldera-utils"))
        .args(["generate-config", "-o", s(&config)])
        .output()
        .expect("Failed to execute cldera-utils");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("\x1b["),
        "Should contain ANSI color codes when color is enabled"
    );

    let output = cldera_utils(&["generate-config", "-o", s(&config), "-O"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        !stdout.contains("\x1b["),
        "Should not contain ANSI color codes when --no-color is used"
    );
}

#[test]
fn test_cli_with_nonexistent_input() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let output = temp_dir.path().join("mask.zarr");
    let stderr = assert_fail(&cldera_utils(&[
        "zonal-masks",
        "-i",
        "/nonexistent/path/to/store",
        "-m",
        s(&output),
    ]));
    assert!(stderr.contains("does not exist"), "stderr: {}", stderr);
}
