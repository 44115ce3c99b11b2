/// Fits a proposed image size into a host window.
///
/// The popup may cover at most `fraction` of either host dimension. Images
/// that already fit are left alone; larger ones are scaled down uniformly
/// until the dominant axis sits exactly at `fraction` of the host. Never
/// scales up.
#[derive(Debug, Clone, Copy)]
pub struct FitToHost {
    /// Host window width in pixels
    pub host_width: i32,
    /// Host window height in pixels
    pub host_height: i32,
    /// Largest share of either host dimension (default: 0.8)
    pub fraction: f64,
}

impl FitToHost {
    pub fn new(host_width: i32, host_height: i32, fraction: f64) -> Self {
        Self {
            host_width,
            host_height,
            fraction,
        }
    }

    /// Scale ratio of the proposed size against the host: the larger of the
    /// per-axis ratios.
    pub fn ratio(&self, width: i32, height: i32) -> f64 {
        let rw = f64::from(width) / f64::from(self.host_width);
        let rh = f64::from(height) / f64::from(self.host_height);
        rw.max(rh)
    }

    /// Returns the size the decoder should produce for a `width` x `height`
    /// source.
    ///
    /// The dominant axis is pinned to `fraction * host` and the other axis is
    /// derived from it, which keeps the arithmetic exact for integral inputs
    /// (1200x500 in a 1000x800 host becomes 800x333).
    pub fn apply(&self, width: i32, height: i32) -> (i32, i32) {
        if self.host_width <= 0 || self.host_height <= 0 || width <= 0 || height <= 0 {
            return (width, height);
        }
        if self.ratio(width, height) <= self.fraction {
            return (width, height);
        }

        let (w, h) = (f64::from(width), f64::from(height));
        let width_dominant = w * f64::from(self.host_height) >= h * f64::from(self.host_width);
        let (out_w, out_h) = if width_dominant {
            let target = self.fraction * f64::from(self.host_width);
            (target, h * target / w)
        } else {
            let target = self.fraction * f64::from(self.host_height);
            (w * target / h, target)
        };

        ((out_w as i32).max(1), (out_h as i32).max(1))
    }
}
