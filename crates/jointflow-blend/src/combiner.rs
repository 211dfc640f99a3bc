//! 组合策略
//!
//! 所有策略遵守同一约定：
//! - 至少出现在一帧目标中的关节，输出一个 `[0, 1]` 内的值
//! - 没有任何帧涉及的关节，原样保留 `current` 中的值
//!
//! `frames` 按来源注册顺序排列。

use crate::frame::MotionFrame;
use crate::positions::{JointId, PositionMap};
use crate::source::SourceId;
use jointflow_protocol::Normalized;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 组合策略
///
/// `combine` 在调度线程上同步执行，必须是非阻塞的。
pub trait FrameCombiner: Send + Sync {
    fn combine(
        &self,
        time_ms: u64,
        interval_ms: u64,
        current: &PositionMap,
        frames: &[(MotionFrame, SourceId)],
    ) -> PositionMap;
}

/// 后注册者优先
///
/// 按注册顺序依次覆盖，同一关节取最后一个写入者的目标。
/// 需要优先级的来源（例如安全反射覆盖动画）应晚于低优先级来源注册。
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriterWins;

impl FrameCombiner for LastWriterWins {
    fn combine(
        &self,
        _time_ms: u64,
        _interval_ms: u64,
        current: &PositionMap,
        frames: &[(MotionFrame, SourceId)],
    ) -> PositionMap {
        let mut ordered: Vec<&(MotionFrame, SourceId)> = frames.iter().collect();
        ordered.sort_by_key(|(_, source)| *source);

        let mut out = current.clone();
        for (frame, _) in ordered {
            out.extend(frame.goal_positions().iter());
        }
        out
    }
}

/// 逐关节平均
///
/// 每个关节取所有涉及它的帧目标的算术平均。
#[derive(Debug, Clone, Copy, Default)]
pub struct AveragingCombiner;

impl FrameCombiner for AveragingCombiner {
    fn combine(
        &self,
        _time_ms: u64,
        _interval_ms: u64,
        current: &PositionMap,
        frames: &[(MotionFrame, SourceId)],
    ) -> PositionMap {
        let mut sums: BTreeMap<JointId, (f64, u32)> = BTreeMap::new();
        for (frame, _) in frames {
            for (joint, goal) in frame.goal_positions().iter() {
                let entry = sums.entry(joint).or_insert((0.0, 0));
                entry.0 += goal.value();
                entry.1 += 1;
            }
        }

        let mut out = current.clone();
        for (joint, (sum, count)) in sums {
            out.insert(joint, Normalized::clamped(sum / f64::from(count)));
        }
        out
    }
}

/// 速度叠加
///
/// 每帧的速度为 `(goal - previous) / frame_length`，缺少 previous 的关节速度为 0。
/// 同一关节的速度相加后作用在 `current` 上，持续 `interval_ms`。
/// `current` 中没有该关节时，退化为后注册者的目标。
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityCombiner;

impl FrameCombiner for VelocityCombiner {
    fn combine(
        &self,
        _time_ms: u64,
        interval_ms: u64,
        current: &PositionMap,
        frames: &[(MotionFrame, SourceId)],
    ) -> PositionMap {
        let mut ordered: Vec<&(MotionFrame, SourceId)> = frames.iter().collect();
        ordered.sort_by_key(|(_, source)| *source);

        let mut velocities: BTreeMap<JointId, f64> = BTreeMap::new();
        let mut fallback = PositionMap::new();
        for (frame, _) in ordered {
            let length = frame.frame_length_ms() as f64;
            for (joint, goal) in frame.goal_positions().iter() {
                let velocity = frame
                    .previous_positions()
                    .get(joint)
                    .map(|prev| (goal.value() - prev.value()) / length)
                    .unwrap_or(0.0);
                *velocities.entry(joint).or_insert(0.0) += velocity;
                fallback.insert(joint, goal);
            }
        }

        let mut out = current.clone();
        for (joint, velocity) in velocities {
            let next = match current.get(joint) {
                Some(cur) => Normalized::clamped(cur.value() + velocity * interval_ms as f64),
                None => fallback.get(joint).unwrap_or(Normalized::MIN),
            };
            out.insert(joint, next);
        }
        out
    }
}

/// 组合策略选择（配置时确定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CombinerKind {
    #[default]
    LastWriter,
    Average,
    Velocity,
}

impl CombinerKind {
    pub fn build(self) -> Arc<dyn FrameCombiner> {
        match self {
            CombinerKind::LastWriter => Arc::new(LastWriterWins),
            CombinerKind::Average => Arc::new(AveragingCombiner),
            CombinerKind::Velocity => Arc::new(VelocityCombiner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn n(v: f64) -> Normalized {
        Normalized::new(v).unwrap()
    }

    fn map(entries: &[(u16, f64)]) -> PositionMap {
        entries.iter().map(|&(j, v)| (JointId(j), n(v))).collect()
    }

    fn frame(goals: &[(u16, f64)]) -> MotionFrame {
        MotionFrame::new(1000, 100, map(goals), PositionMap::new()).unwrap()
    }

    fn frame_with_prev(goals: &[(u16, f64)], prev: &[(u16, f64)]) -> MotionFrame {
        MotionFrame::new(1000, 100, map(goals), map(prev)).unwrap()
    }

    #[test]
    fn test_last_writer_disjoint_union() {
        let current = map(&[(1, 0.5), (2, 0.5), (3, 0.5)]);
        let frames = vec![(frame(&[(1, 0.9)]), SourceId(0)), (frame(&[(2, 0.1)]), SourceId(1))];
        let out = LastWriterWins.combine(1000, 100, &current, &frames);
        assert_eq!(out, map(&[(1, 0.9), (2, 0.1), (3, 0.5)]));
    }

    #[test]
    fn test_last_writer_later_source_wins() {
        let current = map(&[(1, 0.5)]);
        // 传入顺序与注册顺序相反，结果仍由注册顺序决定
        let frames = vec![(frame(&[(1, 0.2)]), SourceId(7)), (frame(&[(1, 0.8)]), SourceId(3))];
        let out = LastWriterWins.combine(1000, 100, &current, &frames);
        assert_eq!(out.get(JointId(1)), Some(n(0.2)));
    }

    #[test]
    fn test_last_writer_adds_new_joint() {
        let current = map(&[(1, 0.5)]);
        let frames = vec![(frame(&[(9, 0.3)]), SourceId(0))];
        let out = LastWriterWins.combine(1000, 100, &current, &frames);
        assert_eq!(out, map(&[(1, 0.5), (9, 0.3)]));
    }

    #[test]
    fn test_averaging() {
        let current = map(&[(1, 0.5), (2, 0.5)]);
        let frames = vec![
            (frame(&[(1, 0.2)]), SourceId(0)),
            (frame(&[(1, 0.6), (2, 1.0)]), SourceId(1)),
        ];
        let out = AveragingCombiner.combine(1000, 100, &current, &frames);
        assert!((out.get(JointId(1)).unwrap().value() - 0.4).abs() < 1e-12);
        assert_eq!(out.get(JointId(2)), Some(n(1.0)));
    }

    #[test]
    fn test_velocity_sums_and_applies_over_interval() {
        let current = map(&[(1, 0.5), (2, 0.5)]);
        // 帧 A: 0.1 / 100ms，帧 B: 0.2 / 100ms，合计 0.003 /ms
        let frames = vec![
            (frame_with_prev(&[(1, 0.6)], &[(1, 0.5)]), SourceId(0)),
            (frame_with_prev(&[(1, 0.7)], &[(1, 0.5)]), SourceId(1)),
        ];
        let out = VelocityCombiner.combine(1000, 20, &current, &frames);
        assert!((out.get(JointId(1)).unwrap().value() - 0.56).abs() < 1e-9);
        assert_eq!(out.get(JointId(2)), Some(n(0.5)));
    }

    #[test]
    fn test_velocity_clamps_and_handles_missing_previous() {
        let current = map(&[(1, 0.95), (2, 0.5)]);
        let frames = vec![
            (frame_with_prev(&[(1, 1.0)], &[(1, 0.0)]), SourceId(0)),
            (frame(&[(2, 0.9)]), SourceId(1)),
        ];
        let out = VelocityCombiner.combine(1000, 100, &current, &frames);
        assert_eq!(out.get(JointId(1)), Some(Normalized::MAX));
        assert_eq!(out.get(JointId(2)), Some(n(0.5)), "no previous position, zero velocity");
    }

    #[test]
    fn test_combiner_kind_build() {
        let current = map(&[(1, 0.5)]);
        let frames = vec![(frame(&[(1, 0.9)]), SourceId(0))];
        for kind in [CombinerKind::LastWriter, CombinerKind::Average] {
            let out = kind.build().combine(1000, 100, &current, &frames);
            assert_eq!(out.get(JointId(1)), Some(n(0.9)));
        }
    }

    fn positions() -> impl Strategy<Value = BTreeMap<u16, f64>> {
        prop::collection::btree_map(0u16..16, 0.0f64..=1.0, 0..8)
    }

    proptest! {
        #[test]
        fn prop_disjoint_frames_union(
            baseline in positions(),
            a in positions(),
            b in positions(),
        ) {
            // 去掉 b 中与 a 重叠的关节，得到互不相交的两组目标
            let b: BTreeMap<u16, f64> = b.into_iter().filter(|(j, _)| !a.contains_key(j)).collect();
            let to_map = |m: &BTreeMap<u16, f64>| -> PositionMap {
                m.iter().map(|(j, v)| (JointId(*j), n(*v))).collect()
            };
            let current = to_map(&baseline);
            let frames = vec![
                (MotionFrame::new(1, 10, to_map(&a), PositionMap::new()).unwrap(), SourceId(0)),
                (MotionFrame::new(1, 10, to_map(&b), PositionMap::new()).unwrap(), SourceId(1)),
            ];

            for combiner in [CombinerKind::LastWriter.build(), CombinerKind::Average.build()] {
                let out = combiner.combine(1, 10, &current, &frames);
                for (j, v) in a.iter().chain(b.iter()) {
                    prop_assert_eq!(out.get(JointId(*j)), Some(n(*v)));
                }
            }
        }

        #[test]
        fn prop_untouched_joints_hold(
            baseline in positions(),
            goals in positions(),
        ) {
            let current: PositionMap = baseline.iter().map(|(j, v)| (JointId(*j), n(*v))).collect();
            let goal_map: PositionMap = goals.iter().map(|(j, v)| (JointId(*j), n(*v))).collect();
            let frames = vec![(MotionFrame::new(1, 10, goal_map, PositionMap::new()).unwrap(), SourceId(0))];

            for kind in [CombinerKind::LastWriter, CombinerKind::Average, CombinerKind::Velocity] {
                let out = kind.build().combine(1, 10, &current, &frames);
                for (j, v) in baseline.iter().filter(|(j, _)| !goals.contains_key(j)) {
                    prop_assert_eq!(out.get(JointId(*j)), Some(n(*v)));
                }
            }
        }
    }
}
