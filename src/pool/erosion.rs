//! 空闲连接侵蚀
//!
//! 在归还连接时检查：到期后若空闲数高于 `min_idle`，则销毁这次归还的连接，
//! 并根据当前空闲数相对历史高水位的比例计算下一次到期时间。
//! 空闲越多，下一次收缩来得越快（1 分钟到 15 分钟之间，再乘以侵蚀因子）。

use std::time::Duration;
use tokio::time::Instant;

const MAX_INTERVAL_MINUTES: f32 = 15.0;
const MILLIS_PER_MINUTE: f32 = 60_000.0;

#[derive(Debug)]
pub(crate) struct Erosion {
    factor: f32,
    next_shrink: Instant,
    idle_high_water_mark: usize,
}

impl Erosion {
    /// 因子 `<= 0` 时不启用
    pub(crate) fn new(factor: f32, now: Instant) -> Option<Self> {
        if factor > 0.0 {
            Some(Self {
                factor,
                next_shrink: now + scaled(MAX_INTERVAL_MINUTES, factor),
                idle_high_water_mark: 1,
            })
        } else {
            None
        }
    }

    /// 本次归还是否应当销毁连接
    ///
    /// 到期时同时更新下一次收缩时间。
    pub(crate) fn should_shrink(&mut self, now: Instant, idle: usize, min_idle: usize) -> bool {
        if now < self.next_shrink {
            return false;
        }
        let shrink = idle > min_idle;
        self.update(now, idle);
        shrink
    }

    pub(crate) fn next_shrink(&self) -> Instant {
        self.next_shrink
    }

    fn update(&mut self, now: Instant, idle: usize) {
        self.idle_high_water_mark = self.idle_high_water_mark.max(idle);
        let minutes = MAX_INTERVAL_MINUTES
            + ((1.0 - MAX_INTERVAL_MINUTES) / self.idle_high_water_mark as f32) * idle as f32;
        self.next_shrink = now + scaled(minutes, self.factor);
    }
}

fn scaled(minutes: f32, factor: f32) -> Duration {
    Duration::from_millis((minutes * MILLIS_PER_MINUTE * factor) as u64)
}

