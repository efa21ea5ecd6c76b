use crate::config::PanelConfig;
use crate::geometry::{Point, Rect, Size};

/// Top-left corner for a panel of `panel` size next to `anchor`.
///
/// The panel's right edge lines up with the anchor's right edge and it sits
/// above the anchor, flipping below when it would cross the top margin.
/// Horizontally it is clamped into the viewport margins; a panel wider than
/// the viewport pins to the left margin.
pub fn place_panel(anchor: Rect, panel: Size, viewport: Size, config: &PanelConfig) -> Point {
    let mut top = anchor.top - config.gap - panel.height;
    if top < config.margin_top {
        top = anchor.bottom() + config.gap;
        let lowest = viewport.height - config.margin_bottom - panel.height;
        if top > lowest {
            top = lowest.max(config.margin_top);
        }
    }

    let rightmost = viewport.width - config.margin_right - panel.width;
    let left = (anchor.right() - panel.width)
        .min(rightmost)
        .max(config.margin_left);

    Point { left, top }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Size = Size::new(1280.0, 800.0);
    const PANEL: Size = Size::new(250.0, 170.0);

    fn place(anchor: Rect) -> Point {
        place_panel(anchor, PANEL, VIEWPORT, &PanelConfig::default())
    }

    #[test]
    fn sits_above_with_right_edges_aligned() {
        let point = place(Rect::new(600.0, 500.0, 32.0, 32.0));
        assert_eq!(point.left, 632.0 - 250.0);
        assert_eq!(point.top, 500.0 - 8.0 - 170.0);
    }

    #[test]
    fn flips_below_near_top_edge() {
        let point = place(Rect::new(600.0, 100.0, 32.0, 32.0));
        assert_eq!(point.top, 132.0 + 8.0);
    }

    #[test]
    fn clamps_into_horizontal_margins() {
        assert_eq!(place(Rect::new(20.0, 500.0, 32.0, 32.0)).left, 10.0);

        let narrow = Size::new(400.0, 800.0);
        let point = place_panel(
            Rect::new(380.0, 500.0, 40.0, 32.0),
            PANEL,
            narrow,
            &PanelConfig::default(),
        );
        assert_eq!(point.left, 400.0 - 10.0 - 250.0);
    }

    #[test]
    fn stays_within_margins_wherever_it_fits() {
        let config = PanelConfig::default();
        for step in 0..=64 {
            let x = -200.0 + step as f64 * 25.0;
            for y in [0.0, 50.0, 150.0, 400.0, 790.0] {
                let point = place(Rect::new(x, y, 40.0, 30.0));
                assert!(point.left >= config.margin_left, "left {} at x {x}", point.left);
                assert!(
                    point.left + PANEL.width <= VIEWPORT.width - config.margin_right,
                    "right edge overflows at x {x}"
                );
                if point.top < config.margin_top {
                    panic!("top {} crosses the margin at y {y}", point.top);
                }
            }
        }
    }
}
