//! Color resolution for arrivals.
//!
//! Colors live in a `Palette`, which owns them; everything else refers to
//! palette entries through a `ColorHandle`.

use palette::Srgb;
use std::collections::HashMap;

/// Lookup form of a route, direction or color name.
///
/// Config files come back with their keys lowercased, so every lookup
/// ignores case: `N`, `n` and ` N ` are the same route.
pub fn fold(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Index of a color in a `Palette`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColorHandle(usize);

/// Named color registry.
#[derive(Clone, Debug)]
pub struct Palette {
    names: HashMap<String, ColorHandle>,
    colors: Vec<Srgb<u8>>,
}

impl Palette {
    /// Handle of the color used when nothing else applies (white).
    pub const FALLBACK: ColorHandle = ColorHandle(0);

    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
            colors: vec![Srgb::new(255, 255, 255)]
        }
    }
    /// Adds (or replaces) a named color.
    pub fn insert(&mut self, name: &str, color: Srgb<u8>) -> ColorHandle {
        let name = fold(name);
        if let Some(&h) = self.names.get(&name) {
            self.colors[h.0] = color;
            return h;
        }
        let h = ColorHandle(self.colors.len());
        self.colors.push(color);
        self.names.insert(name, h);
        h
    }
    pub fn lookup(&self, name: &str) -> Option<ColorHandle> {
        self.names.get(&fold(name)).copied()
    }
    pub fn color(&self, h: ColorHandle) -> Srgb<u8> {
        self.colors.get(h.0)
            .copied()
            .unwrap_or(self.colors[Self::FALLBACK.0])
    }
    /// `#rrggbb` rendering of a color.
    pub fn hex(&self, h: ColorHandle) -> String {
        let c = self.color(h);
        format!("#{:02x}{:02x}{:02x}", c.red, c.green, c.blue)
    }
    pub fn len(&self) -> usize {
        self.names.len()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps routes and directions onto palette colors.
///
/// Built once from configuration and never modified afterwards.
#[derive(Clone, Debug, Default)]
pub struct Classifier {
    route_colors: HashMap<String, ColorHandle>,
    direction_colors: HashMap<String, ColorHandle>,
    pub(crate) default_route: Option<ColorHandle>,
    pub(crate) separator: Option<ColorHandle>,
}

impl Classifier {
    /// Color for an arrival on `route` heading in `direction`.
    ///
    /// Route beats direction beats the configured default beats
    /// `Palette::FALLBACK`.
    pub fn classify(&self, route: &str, direction: &str) -> ColorHandle {
        self.route_colors.get(&fold(route))
            .or_else(|| self.direction_colors.get(&fold(direction)))
            .copied()
            .or(self.default_route)
            .unwrap_or(Palette::FALLBACK)
    }
    pub fn route_color(&self, route: &str) -> ColorHandle {
        self.route_colors.get(&fold(route))
            .copied()
            .or(self.default_route)
            .unwrap_or(Palette::FALLBACK)
    }
    pub fn direction_color(&self, direction: &str) -> ColorHandle {
        self.direction_colors.get(&fold(direction))
            .copied()
            .or(self.default_route)
            .unwrap_or(Palette::FALLBACK)
    }
    pub fn set_route_color(&mut self, route: &str, color: ColorHandle) {
        self.route_colors.insert(fold(route), color);
    }
    pub fn set_direction_color(&mut self, direction: &str, color: ColorHandle) {
        self.direction_colors.insert(fold(direction), color);
    }
    /// Rule keys, as stored.
    pub fn route_keys(&self) -> impl Iterator<Item = &str> {
        self.route_colors.keys().map(|k| k as &str)
    }
    pub fn direction_keys(&self) -> impl Iterator<Item = &str> {
        self.direction_colors.keys().map(|k| k as &str)
    }
    /// Divider color between groups of arrivals. Never assigned to an arrival.
    pub fn separator_color(&self) -> ColorHandle {
        self.separator.unwrap_or(Palette::FALLBACK)
    }
}
