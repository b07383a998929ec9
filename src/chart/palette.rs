// =============================================================================
// Line colours
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::Rng;

/// Hex digits used for random colours. 0-2 are left out so no line comes
/// out too dark against the background.
const COLOR_DIGITS: &[u8] = b"3456789ABCDEF";

/// A random `#RRGGBB` colour drawn from [`COLOR_DIGITS`].
pub fn random_color() -> String {
    let mut rng = rand::rng();
    let mut color = String::with_capacity(7);
    color.push('#');
    for _ in 0..6 {
        let idx = rng.random_range(0..COLOR_DIGITS.len());
        color.push(COLOR_DIGITS[idx] as char);
    }
    color
}

/// Assigns each ticker a colour and keeps it until the ticker is released,
/// so a line does not change colour every time the chart refreshes.
#[derive(Debug, Default)]
pub struct Palette {
    colors: RwLock<HashMap<String, String>>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Colour for `ticker`, picking a new random one on first use.
    pub fn color_for(&self, ticker: &str) -> String {
        if let Some(color) = self.colors.read().get(ticker) {
            return color.clone();
        }
        self.colors
            .write()
            .entry(ticker.to_string())
            .or_insert_with(random_color)
            .clone()
    }

    /// Forget the colour of a ticker that left the watch-list.
    pub fn release(&self, ticker: &str) {
        self.colors.write().remove(ticker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_color_format() {
        for _ in 0..50 {
            let color = random_color();
            assert_eq!(color.len(), 7);
            assert!(color.starts_with('#'));
            assert!(color[1..].bytes().all(|b| COLOR_DIGITS.contains(&b)));
        }
    }

    #[test]
    fn palette_is_stable_until_released() {
        let palette = Palette::new();
        let first = palette.color_for("AAPL");
        assert_eq!(palette.color_for("AAPL"), first);

        palette.release("AAPL");
        // A fresh colour is drawn; it may coincide, so only check it exists.
        assert_eq!(palette.color_for("AAPL").len(), 7);
    }
}
