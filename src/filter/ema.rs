use super::SmoothingFilter;

/// 指数移動平均（成分ごと）
///
/// 時間間隔に依存しない。alpha が大きいほど新しい値に追従する。
pub struct EmaFilter {
    alpha: f32,
    prev: Option<Vec<f32>>,
}

impl EmaFilter {
    pub fn new(alpha: f32) -> Self {
        Self { alpha: alpha.clamp(0.0, 1.0), prev: None }
    }
}

impl SmoothingFilter for EmaFilter {
    fn filter(&mut self, value: &mut [f32], _timestamp_ms: f64) {
        let a = self.alpha;
        match self.prev.as_mut() {
            Some(prev) if prev.len() == value.len() => {
                for (v, p) in value.iter_mut().zip(prev.iter_mut()) {
                    *v = a * *v + (1.0 - a) * *p;
                    *p = *v;
                }
            }
            _ => self.prev = Some(value.to_vec()),
        }
    }

    fn reset(&mut self) {
        self.prev = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_passthrough() {
        let mut f = EmaFilter::new(0.5);
        let mut v = [1.0, 2.0, 3.0];
        f.filter(&mut v, 0.0);
        assert_eq!(v, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_ema_blend() {
        let mut f = EmaFilter::new(0.25);
        let mut v = [0.0];
        f.filter(&mut v, 0.0);
        let mut v = [8.0];
        f.filter(&mut v, 20.0);
        assert_eq!(v, [2.0]);
        let mut v = [8.0];
        f.filter(&mut v, 40.0);
        assert_eq!(v, [3.5]);
    }

    #[test]
    fn test_alpha_one_is_identity() {
        let mut f = EmaFilter::new(1.0);
        let mut v = [0.0];
        f.filter(&mut v, 0.0);
        let mut v = [5.0];
        f.filter(&mut v, 1.0);
        assert_eq!(v, [5.0]);
    }
}
