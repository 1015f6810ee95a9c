use gudrun_core::config::{Dimensions, GudrunFile, parse_document, render_document};
use gudrun_core::domain::{CrossSectionSource, Geometry, GudrunError, Section, UnitsOfDensity};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/nimrod_water.txt")
}

fn fixture() -> GudrunFile {
    GudrunFile::from_path(fixture_path()).expect("fixture should parse")
}

fn fit_dimensions(dimensions: &mut Dimensions, flat: bool) {
    *dimensions = if flat {
        Dimensions {
            upstream_thickness: 0.1,
            downstream_thickness: 0.15,
            angle_of_rotation: 5.0,
            sample_width: 4.5,
            ..Dimensions::default()
        }
    } else {
        Dimensions {
            inner_radius: 0.2,
            outer_radius: 0.3175,
            sample_height: 4.0,
            ..Dimensions::default()
        }
    };
}

fn with_shapes(
    beam: Geometry,
    sample_geometry: Geometry,
    source: CrossSectionSource,
) -> GudrunFile {
    let mut document = fixture();
    Arc::make_mut(&mut document.beam).sample_geometry = beam;

    let normalisation = Arc::make_mut(&mut document.normalisation);
    fit_dimensions(
        &mut normalisation.dimensions,
        normalisation.geometry.is_flat_plate(beam),
    );

    for sample in document.samples_mut() {
        sample.geometry = sample_geometry;
        fit_dimensions(&mut sample.dimensions, sample_geometry.is_flat_plate(beam));
        sample.total_cross_section_source = source;
        sample.cross_section_file = match source {
            CrossSectionSource::File => "data/h2o.xs".to_string(),
            _ => String::new(),
        };
        for container in &mut sample.containers {
            fit_dimensions(
                &mut container.dimensions,
                container.geometry.is_flat_plate(beam),
            );
        }
    }
    document
}

#[test]
fn fixture_parses_every_section() {
    let document = fixture();

    assert_eq!(document.beam.sample_geometry, Geometry::Cylindrical);
    assert_eq!(document.instrument.incident_monitor_spectra, vec![1, 2, 3]);
    assert_eq!(document.sample_backgrounds.len(), 1);

    let sample = document.samples().next().expect("fixture has a sample");
    assert_eq!(sample.name, "H2O");
    assert_eq!(sample.density.units, UnitsOfDensity::Chemical);
    assert_eq!(sample.density.magnitude, 1.05285);
    assert_eq!(sample.containers.len(), 1);
    assert_eq!(
        sample.containers[0].density.units,
        UnitsOfDensity::Atomic
    );
    assert_eq!(sample.containers[0].density.magnitude, 0.0542);

    let names = document
        .components
        .iter()
        .map(|component| component.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Water", "Heavy water"]);
    let heavy = document.component("Heavy water").expect("component should exist");
    assert_eq!(heavy.elements[0].mass_number, 2);
}

#[test]
fn every_geometry_and_cross_section_source_round_trips() {
    for beam in [Geometry::FlatPlate, Geometry::Cylindrical] {
        for sample_geometry in [Geometry::FlatPlate, Geometry::Cylindrical, Geometry::SameAsBeam] {
            for source in [
                CrossSectionSource::Tables,
                CrossSectionSource::Transmission,
                CrossSectionSource::File,
            ] {
                let document = with_shapes(beam, sample_geometry, source);
                let text = render_document(&document, "1700000000");
                let reparsed = parse_document(&text).unwrap_or_else(|error| {
                    panic!("{beam}/{sample_geometry}/{source:?} failed to parse: {error}")
                });
                assert_eq!(
                    reparsed, document,
                    "{beam}/{sample_geometry}/{source:?} changed on round trip"
                );
            }
        }
    }
}

#[test]
fn rendering_is_stable_apart_from_the_timestamp() {
    let document = fixture();
    let first = render_document(&document, "1");
    let second = render_document(
        &parse_document(&first).expect("rendered document should parse"),
        "2",
    );
    assert_eq!(
        first.replace("written:  1", "written:  2"),
        second
    );
}

#[test]
fn written_configuration_reloads() {
    let temp = TempDir::new().expect("tempdir should be created");
    let path = temp.path().join("gudpy.txt");
    let document = fixture();
    document.write_to(&path).expect("document should be written");
    assert_eq!(GudrunFile::from_path(&path).expect("document should reload"), document);
}

#[test]
fn malformed_sample_names_its_section() {
    let source = std::fs::read_to_string(fixture_path())
        .expect("fixture should be readable")
        .replace("1.05285          Density", "dense          Density");
    let error = parse_document(&source).expect_err("malformed density should fail");
    assert!(matches!(
        error,
        GudrunError::Parse {
            section: Section::Sample,
            ..
        }
    ));
    assert_eq!(error.exit_code(), 2);
}

#[test]
fn missing_configuration_is_a_path_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let error = GudrunFile::from_path(temp.path().join("absent.txt"))
        .expect_err("missing file should fail");
    assert!(matches!(error, GudrunError::Path { .. }));
}
