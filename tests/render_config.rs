//! End-to-end render runs against real PNG files on disk.

use image::{Rgba, RgbaImage};
use layersheet::config::RenderConfig;
use layersheet::render::{self, RenderEvent};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SKIN: Rgba<u8> = Rgba([224, 172, 105, 255]);
const STEEL: Rgba<u8> = Rgba([160, 160, 170, 255]);
const HAIR: Rgba<u8> = Rgba([40, 20, 10, 255]);

fn write_png(root: &Path, relative: &str, image: &RgbaImage) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    image.save(&path).unwrap();
}

/// 2×2 frame, transparent except the top-left pixel.
fn corner(color: Rgba<u8>) -> RgbaImage {
    let mut image = RgbaImage::new(2, 2);
    image.put_pixel(0, 0, color);
    image
}

/// A small library: per-animation body and armour strips plus a character
/// component library, and a config that uses all three job kinds.
fn setup(tmp: &Path) -> RenderConfig {
    let assets = tmp.join("assets");
    for animation in ["walk", "slash"] {
        write_png(
            &assets,
            &format!("body/male/{animation}/light.png"),
            &RgbaImage::from_pixel(2, 2, SKIN),
        );
        for variant in ["light", "steel"] {
            write_png(
                &assets,
                &format!("arms/male/{animation}/{variant}.png"),
                &corner(STEEL),
            );
        }
    }
    write_png(
        &assets,
        "arms/female/walk/steel.png",
        &RgbaImage::from_pixel(2, 2, STEEL),
    );

    let library = tmp.join("spritesheets");
    write_png(
        &library,
        "body/bodies/male/walk/light.png",
        &RgbaImage::from_pixel(3, 3, SKIN),
    );
    write_png(
        &library,
        "hair/long/male/walk/black.png",
        &corner(HAIR),
    );

    let definitions = tmp.join("defs");
    fs::create_dir_all(&definitions).unwrap();
    fs::write(
        definitions.join("armour.json"),
        r#"{
            "variants": ["light"],
            "animations": ["walk", "slash"],
            "replace_in_path": {"VARIANT_DIR": "arms"},
            "layer_1": {"male": "body/male"},
            "layer_2": {"male": "VARIANT_DIR/male", "female": "VARIANT_DIR/female"}
        }"#,
    )
    .unwrap();
    fs::write(
        definitions.join("arms.json"),
        r#"{
            "variants": ["steel", "gold"],
            "animations": ["walk"],
            "layer_1": {"male": "arms/male", "female": "arms/female"}
        }"#,
    )
    .unwrap();

    let json = serde_json::json!({
        "output_dir": tmp.join("out"),
        "sheet_definitions_path": definitions,
        "asset_root": assets,
        "spritesheets_path": library,
        "canvas": {"mode": "adaptive"},
        "layout": "per_animation",
        "sprites": [
            {"definition_name": "armour", "variant": "light", "sex": "male", "output_name": "armour.png"}
        ],
        "batch_jobs": [
            {"definition_name": "arms", "variants": ["steel"]}
        ],
        "characters": [
            {"name": "hero", "components": {"hair": {"style": "long", "variant": "black"}}}
        ]
    });
    RenderConfig::from_json(&json.to_string()).unwrap()
}

#[test]
fn full_run_writes_every_output() {
    let tmp = TempDir::new().unwrap();
    let config = setup(tmp.path());

    let (tx, rx) = std::sync::mpsc::channel();
    let summary = render::render(&config, true, Some(tx)).unwrap();
    let events: Vec<RenderEvent> = rx.into_iter().collect();

    assert_eq!(summary.failed, 0, "{events:?}");
    assert_eq!(summary.written, 4);

    let out = &config.output_dir;
    let armour = image::open(out.join("armour.png")).unwrap().to_rgba8();
    // walk + slash strips side by side, armour over body on the left pixel of each
    assert_eq!(armour.dimensions(), (4, 2));
    assert_eq!(*armour.get_pixel(0, 0), STEEL);
    assert_eq!(*armour.get_pixel(1, 0), SKIN);
    assert_eq!(*armour.get_pixel(2, 0), STEEL);
    assert_eq!(*armour.get_pixel(3, 1), SKIN);

    assert!(out.join("arms_steel_male.png").exists());
    assert!(out.join("arms_steel_female.png").exists());

    let hero = image::open(out.join("hero.png")).unwrap().to_rgba8();
    assert_eq!(hero.dimensions(), (3, 3));
    assert_eq!(*hero.get_pixel(0, 0), HAIR);
    assert_eq!(*hero.get_pixel(2, 2), SKIN);
}

#[test]
fn complete_assets_leave_no_diagnostics() {
    let tmp = TempDir::new().unwrap();
    let config = setup(tmp.path());

    let (tx, rx) = std::sync::mpsc::channel();
    render::render(&config, true, Some(tx)).unwrap();

    // every armour frame exists; the hero's body has only a walk strip, which
    // is normal for characters and not a diagnostic
    let events: Vec<RenderEvent> = rx.into_iter().collect();
    let armour = events
        .iter()
        .find_map(|e| match e {
            RenderEvent::Rendered {
                output,
                diagnostics,
                ..
            } if output == "armour.png" => Some(diagnostics.clone()),
            _ => None,
        })
        .unwrap();
    assert!(armour.is_empty());

    let hero = events
        .iter()
        .find_map(|e| match e {
            RenderEvent::Rendered {
                output, layers, ..
            } if output == "hero.png" => Some(*layers),
            _ => None,
        })
        .unwrap();
    assert_eq!(hero, 2);
}

#[test]
fn rerun_hits_the_cache_and_no_cache_rerenders() {
    let tmp = TempDir::new().unwrap();
    let config = setup(tmp.path());

    render::render(&config, true, None).unwrap();
    let again = render::render(&config, true, None).unwrap();
    assert_eq!(again.written, 0);
    assert_eq!(again.cached, 4);
    assert_eq!(again.cache_stats.hits, 4);

    let forced = render::render(&config, false, None).unwrap();
    assert_eq!(forced.written, 4);
    assert_eq!(forced.cached, 0);
}

#[test]
fn new_asset_invalidates_only_its_sheet() {
    let tmp = TempDir::new().unwrap();
    let config = setup(tmp.path());
    render::render(&config, true, None).unwrap();

    write_png(
        &config.asset_root,
        "arms/female/slash/steel.png",
        &RgbaImage::from_pixel(2, 2, STEEL),
    );
    let arms = fs::read_to_string(config.sheet_definitions_path.join("arms.json")).unwrap();
    fs::write(
        config.sheet_definitions_path.join("arms.json"),
        arms.replace(r#"["walk"]"#, r#"["walk", "slash"]"#),
    )
    .unwrap();

    let summary = render::render(&config, true, None).unwrap();
    // both arms cells depend on arms.json; armour and hero are untouched
    assert_eq!(summary.written, 2);
    assert_eq!(summary.cached, 2);
}

#[test]
fn unknown_definition_fails_alone() {
    let tmp = TempDir::new().unwrap();
    let mut config = setup(tmp.path());
    config.sprites[0].definition_name = "nonexistent".to_string();

    let summary = render::render(&config, true, None).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.written, 3);
}
