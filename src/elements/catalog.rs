//! Built-in line catalogue (Liros, Edelrid)

use super::line_type::{Color, LineType, LineTypeRegistry};

fn color(hex: &str) -> Color {
    // literals below are valid hex
    Color::parse_hex(hex).unwrap_or(Color { r: 0, g: 0, b: 0 })
}

fn liros() -> Vec<LineType> {
    let tsl_colors = [
        ("blue", "0095D8"),
        ("yellow", "FFDD00"),
        ("green", "009037"),
        ("orange", "EB6A27"),
        ("red", "E2001A"),
    ];
    let tsl = |name: &str, diameter: f64, curve: Vec<(f64, f64)>, strength: f64, weight: f64| {
        tsl_colors.iter().fold(
            LineType::new(&format!("liros.tsl{}", name), diameter, curve, strength, weight, true),
            |lt, (n, hex)| lt.with_color(n, color(hex)),
        )
    };

    vec![
        LineType::new("liros.ltc25", 0.39, vec![(250.0, 4.8)], 250.0, 0.13, false),
        LineType::new("liros.ltc45", 0.55, vec![(100.0, 0.85)], 450.0, 0.28, false),
        LineType::new("liros.ltc65", 0.65, vec![(100.0, 0.8)], 650.0, 0.45, false),
        LineType::new("liros.ltc80", 0.7, vec![(100.0, 0.65), (300.0, 1.65)], 800.0, 0.57, false),
        LineType::new("liros.ltc120", 1.1, vec![(100.0, 0.6), (300.0, 1.2)], 1200.0, 0.84, false),
        LineType::new("liros.ltc160", 1.2, vec![(100.0, 0.55), (300.0, 1.05)], 1600.0, 1.17, false),
        LineType::new("liros.ltc200", 1.3, vec![(100.0, 0.6), (300.0, 1.1)], 2000.0, 1.42, false),
        LineType::new("liros.ltc350", 1.75, vec![(100.0, 0.35), (300.0, 0.8)], 3500.0, 2.16, false),
        LineType::new("liros.ntsl120", 1.25, vec![(100.0, 0.29), (300.0, 0.94)], 1200.0, 1.24, true),
        LineType::new("liros.ntsl160", 1.4, vec![(100.0, 0.235), (300.0, 0.797)], 1600.0, 1.52, true),
        LineType::new("liros.ntsl200", 1.9, vec![(100.0, 0.55), (300.0, 1.34)], 2000.0, 2.66, true),
        LineType::new("liros.ntsl250", 2.15, vec![(100.0, 0.46), (300.0, 1.38)], 2500.0, 3.37, true),
        LineType::new("liros.ntsl350", 2.25, vec![(100.0, 0.23), (300.0, 0.46)], 3500.0, 3.46, true),
        tsl("090", 1.1, vec![(100.0, 0.5), (300.0, 1.3)], 900.0, 1.1),
        tsl("140", 1.4, vec![(100.0, 0.4), (300.0, 1.1)], 1400.0, 1.6),
        tsl("220", 1.6, vec![(100.0, 0.3), (300.0, 0.9)], 2200.0, 2.3),
        LineType::new("liros.dsl25", 0.8, vec![(340.0, 3.7)], 250.0, 0.53, true),
        LineType::new("liros.dsl35", 0.9, vec![(380.0, 3.6)], 350.0, 0.64, true),
    ]
}

fn edelrid() -> Vec<LineType> {
    let a8001 = |strength: u32, diameter: f64, weight: f64| {
        let load = 10.0 * strength as f64;
        LineType::new(
            &format!("edelrid.A-8001-{:03}", strength),
            diameter,
            vec![(load, 5.0)],
            load,
            weight,
            false,
        )
        .with_color("orange", color("ff6600"))
        .with_color("blue", color("0f52ba"))
        .with_color("magenta", color("c92351"))
        .with_color("nature", color("CABB84"))
    };
    let a6843 = |strength: u32, diameter: f64, weight: f64| {
        let load = 10.0 * strength as f64;
        LineType::new(
            &format!("edelrid.A-6843-{:03}", strength),
            diameter,
            vec![(load, 5.0)],
            load,
            weight,
            true,
        )
        .with_color("sky", color("0095D8"))
        .with_color("yellow", color("FFDD00"))
        .with_color("green", color("009037"))
        .with_color("red", color("E2001A"))
    };

    vec![
        a8001(25, 0.4, 0.15),
        a8001(50, 0.5, 0.25),
        a8001(70, 0.7, 0.4),
        a8001(90, 0.8, 0.55),
        a8001(130, 1.0, 0.8),
        a8001(190, 1.2, 1.1),
        a8001(230, 1.5, 1.4),
        a8001(280, 1.7, 1.7),
        a8001(340, 1.9, 2.1),
        a6843(140, 1.4, 1.5),
        a6843(180, 1.5, 1.8),
        a6843(230, 1.9, 2.8),
        a6843(280, 2.1, 3.2),
        a6843(370, 2.4, 4.6),
    ]
}

/// Register every catalogue entry that is not yet present
pub(crate) fn register_all(registry: &mut LineTypeRegistry) {
    let mut types = liros();
    types.extend(edelrid());
    for line_type in types {
        if registry.contains(&line_type.name) {
            log::warn!("line type {} already registered, keeping existing entry", line_type.name);
            continue;
        }
        if let Err(e) = registry.register(line_type) {
            log::error!("failed to register catalogue line type: {}", e);
        }
    }
}
