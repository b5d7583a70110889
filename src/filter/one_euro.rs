use super::SmoothingFilter;

/// Low-pass filter component
#[derive(Debug, Clone, Default)]
struct LowPassFilter {
    prev: Option<f32>,
}

impl LowPassFilter {
    fn filter(&mut self, value: f32, alpha: f32) -> f32 {
        match self.prev {
            Some(prev) => {
                let result = alpha * value + (1.0 - alpha) * prev;
                self.prev = Some(result);
                result
            }
            None => {
                self.prev = Some(value);
                value
            }
        }
    }

    fn reset(&mut self) {
        self.prev = None;
    }
}

/// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc)
fn smoothing_factor(te: f32, cutoff: f32) -> f32 {
    let r = 2.0 * std::f32::consts::PI * cutoff * te;
    r / (r + 1.0)
}

/// One Euro Filter for a single scalar value
#[derive(Debug, Clone)]
struct ScalarFilter {
    min_cutoff: f32,
    beta: f32,
    d_cutoff: f32,
    x_filter: LowPassFilter,
    dx_filter: LowPassFilter,
    prev_value: Option<f32>,
}

impl ScalarFilter {
    fn new(min_cutoff: f32, beta: f32, d_cutoff: f32) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            x_filter: LowPassFilter::default(),
            dx_filter: LowPassFilter::default(),
            prev_value: None,
        }
    }

    fn filter(&mut self, value: f32, dt: f32) -> f32 {
        let dx = match self.prev_value {
            Some(prev) if dt > 0.0 => (value - prev) / dt,
            _ => 0.0,
        };
        self.prev_value = Some(value);

        let edx = self
            .dx_filter
            .filter(dx, smoothing_factor(dt, self.d_cutoff));
        let cutoff = self.min_cutoff + self.beta * edx.abs();
        self.x_filter.filter(value, smoothing_factor(dt, cutoff))
    }

    fn reset(&mut self) {
        self.x_filter.reset();
        self.dx_filter.reset();
        self.prev_value = None;
    }
}

/// 多次元 One Euro Filter
///
/// 経過時間は呼び出し側が渡すタイムスタンプ (ms) の差分から求める。
/// 初回や時刻が進まない場合は `1 / fps` 秒を使う。
pub struct OneEuroFilter {
    channels: Vec<ScalarFilter>,
    fallback_dt: f32,
    last_timestamp_ms: Option<f64>,
}

impl OneEuroFilter {
    pub fn new(dims: usize, min_cutoff: f32, beta: f32, d_cutoff: f32, fps: u32) -> Self {
        Self {
            channels: vec![ScalarFilter::new(min_cutoff, beta, d_cutoff); dims],
            fallback_dt: 1.0 / fps.max(1) as f32,
            last_timestamp_ms: None,
        }
    }

    fn elapsed(&mut self, timestamp_ms: f64) -> f32 {
        let dt = match self.last_timestamp_ms {
            Some(last) if timestamp_ms > last => ((timestamp_ms - last) / 1000.0) as f32,
            _ => self.fallback_dt,
        };
        self.last_timestamp_ms = Some(timestamp_ms);
        dt
    }
}

impl SmoothingFilter for OneEuroFilter {
    fn filter(&mut self, value: &mut [f32], timestamp_ms: f64) {
        let dt = self.elapsed(timestamp_ms);
        for (v, f) in value.iter_mut().zip(self.channels.iter_mut()) {
            *v = f.filter(*v, dt);
        }
    }

    fn reset(&mut self) {
        for f in self.channels.iter_mut() {
            f.reset();
        }
        self.last_timestamp_ms = None;
    }
}
