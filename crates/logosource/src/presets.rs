/// A logo compiled into the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub title: &'static str,
    pub svg: &'static str,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "droplet",
        title: "Droplet",
        svg: include_str!("../presets/droplet.svg"),
    },
    Preset {
        name: "ring",
        title: "Ring",
        svg: include_str!("../presets/ring.svg"),
    },
    Preset {
        name: "bolt",
        title: "Bolt",
        svg: include_str!("../presets/bolt.svg"),
    },
    Preset {
        name: "wave",
        title: "Wave",
        svg: include_str!("../presets/wave.svg"),
    },
    Preset {
        name: "star",
        title: "Star",
        svg: include_str!("../presets/star.svg"),
    },
];

/// Shown when no handle is given.
pub const DEFAULT_PRESET: &str = "droplet";

pub fn find_preset(name: &str) -> Option<&'static Preset> {
    let name = name.trim();
    PRESETS
        .iter()
        .find(|preset| preset.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logomask::{normalize, ImageKind, RawImage};

    #[test]
    fn every_preset_is_a_square_svg_that_normalizes() {
        for preset in PRESETS {
            assert_eq!(
                ImageKind::sniff(preset.svg.as_bytes()),
                Some(ImageKind::Svg),
                "{}",
                preset.name
            );
            let raw = RawImage::new(preset.svg.as_bytes().to_vec(), ImageKind::Svg);
            let buffer = normalize(&raw).unwrap_or_else(|err| panic!("{}: {err}", preset.name));
            assert_eq!(buffer.dimensions(), (1000, 1000));
        }
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(find_preset("Bolt").map(|p| p.name), Some("bolt"));
        assert!(find_preset("missing").is_none());
        assert!(find_preset(DEFAULT_PRESET).is_some());
    }
}
