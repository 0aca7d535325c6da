//! 探索木ノード
//!
//! 全フィールドが atomic で、探索中は複数スレッドが Relaxed ordering で
//! 並行更新する。統計値の更新はロスし得るが torn write は起きない
//! （`StatisticsDirtyLockFree` と同じ方針）。子ノード範囲 (first, count)
//! は 1 ワードにパックして CAS で一度だけ公開する。

use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};

use crate::types::{Float, Move};

/// 子ノード範囲の未設定値
const NO_CHILDREN: u64 = 0;

#[inline]
fn pack_child_run(first: u32, count: u16) -> u64 {
    debug_assert!(count > 0);
    ((first as u64) << 16) | count as u64
}

#[inline]
fn unpack_child_run(packed: u64) -> (u32, u16) {
    ((packed >> 16) as u32, (packed & 0xffff) as u16)
}

/// 探索木ノード
///
/// - `value`: 親ノード手番から見たこの指し手の価値の平均。ルートでは
///   ルート手番から見た局面の価値。`value_count > 0` のときのみ意味を持つ。
/// - `visit_count`: 降下時に即時加算される粗いカウント。値の更新は
///   シミュレーション完了後なので `value_count` より先行する。
/// - `rave_count`/`rave_value`: RAVE 擬似観測の記録。`rave_count > 0` の
///   ときのみ意味を持つ。
#[derive(Debug)]
pub struct Node {
    mv: AtomicU16,
    visit_count: AtomicU32,
    value_count: AtomicU32,
    value: AtomicU32,
    rave_count: AtomicU32,
    rave_value: AtomicU32,
    child_run: AtomicU64,
}

#[inline]
fn load_f32(a: &AtomicU32) -> Float {
    Float::from_bits(a.load(Ordering::Relaxed))
}

#[inline]
fn store_f32(a: &AtomicU32, v: Float) {
    a.store(v.to_bits(), Ordering::Relaxed);
}

impl Node {
    pub(crate) fn new() -> Node {
        Node {
            mv: AtomicU16::new(0),
            visit_count: AtomicU32::new(0),
            value_count: AtomicU32::new(0),
            value: AtomicU32::new(0),
            rave_count: AtomicU32::new(0),
            rave_value: AtomicU32::new(0),
            child_run: AtomicU64::new(NO_CHILDREN),
        }
    }

    /// 展開時の初期化（事前知識による prior 込み）
    pub(crate) fn init(&self, mv: Move, value: Float, count: Float) {
        self.mv.store(mv.to_int(), Ordering::Relaxed);
        store_f32(&self.visit_count, 0.0);
        store_f32(&self.value_count, count);
        store_f32(&self.value, value);
        store_f32(&self.rave_count, 0.0);
        store_f32(&self.rave_value, 0.0);
        self.child_run.store(NO_CHILDREN, Ordering::Relaxed);
    }

    #[inline]
    pub fn get_move(&self) -> Move {
        Move::new(self.mv.load(Ordering::Relaxed))
    }

    /// 値の観測数
    ///
    /// prior 初期化や RAVE 擬似観測により visit_count より大きくなり得る。
    #[inline]
    pub fn value_count(&self) -> Float {
        load_f32(&self.value_count)
    }

    /// 値の平均（`value_count > 0` のときのみ意味を持つ）
    #[inline]
    pub fn value(&self) -> Float {
        load_f32(&self.value)
    }

    #[inline]
    pub fn visit_count(&self) -> Float {
        load_f32(&self.visit_count)
    }

    #[inline]
    pub fn rave_count(&self) -> Float {
        load_f32(&self.rave_count)
    }

    /// RAVE 値（`rave_count > 0` のときのみ意味を持つ）
    #[inline]
    pub fn rave_value(&self) -> Float {
        load_f32(&self.rave_value)
    }

    #[inline]
    pub(crate) fn inc_visit_count(&self) {
        store_f32(&self.visit_count, load_f32(&self.visit_count) + 1.0);
    }

    pub(crate) fn add_value(&self, v: Float) {
        let mut count = load_f32(&self.value_count);
        let mut value = load_f32(&self.value);
        count += 1.0;
        value += (v - value) / count;
        store_f32(&self.value, value);
        store_f32(&self.value_count, count);
    }

    pub(crate) fn add_value_weighted(&self, v: Float, weight: Float) {
        let mut count = load_f32(&self.value_count);
        let mut value = load_f32(&self.value);
        count += weight;
        value += weight * (v - value) / count;
        store_f32(&self.value, value);
        store_f32(&self.value_count, count);
    }

    /// 仮想敗北（value 0 の観測）を取り除きつつ実際の結果を適用する
    ///
    /// カウントは仮想敗北で既に 1 加算済みなので据え置き、合計値だけ
    /// v 分補正する。
    pub(crate) fn add_value_remove_loss(&self, v: Float) {
        let count = load_f32(&self.value_count);
        if count == 0.0 {
            // 仮想敗北の加算がロスしていた場合は通常の観測として扱う
            self.add_value(v);
            return;
        }
        let mut value = load_f32(&self.value);
        value += v / count;
        store_f32(&self.value, value);
    }

    /// RAVE 擬似観測の追加
    ///
    /// 重み付きで通常の値統計に混合し（省メモリ RAVE）、同じ観測を
    /// rave 統計にも記録して UI から参照できるようにする。
    pub(crate) fn add_rave_value(&self, v: Float, weight: Float) {
        self.add_value_weighted(v, weight);
        let mut count = load_f32(&self.rave_count);
        let mut value = load_f32(&self.rave_value);
        count += weight;
        value += weight * (v - value) / count;
        store_f32(&self.rave_value, value);
        store_f32(&self.rave_count, count);
    }

    /// 値・RAVE 統計のみクリアする
    ///
    /// サブツリー再利用で深いノードをルートに昇格するとき、ルートの値
    /// （局面価値）と内部ノードの値（指し手価値）は意味が異なるため値は
    /// 引き継げないが、子情報と visit_count は保存する。
    pub(crate) fn clear_values(&self) {
        store_f32(&self.value_count, 0.0);
        store_f32(&self.value, 0.0);
        store_f32(&self.rave_count, 0.0);
        store_f32(&self.rave_value, 0.0);
    }

    /// 統計フィールドのコピー（子リンクはコピーしない）
    pub(crate) fn copy_data_from(&self, other: &Node) {
        self.mv.store(other.mv.load(Ordering::Relaxed), Ordering::Relaxed);
        store_f32(&self.visit_count, other.visit_count());
        store_f32(&self.value_count, other.value_count());
        store_f32(&self.value, other.value());
        store_f32(&self.rave_count, other.rave_count());
        store_f32(&self.rave_value, other.rave_value());
        self.child_run.store(NO_CHILDREN, Ordering::Relaxed);
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.child_run.load(Ordering::Acquire) != NO_CHILDREN
    }

    /// 子ノード範囲 (first, count)
    #[inline]
    pub fn child_run(&self) -> Option<(u32, u16)> {
        let packed = self.child_run.load(Ordering::Acquire);
        if packed == NO_CHILDREN {
            None
        } else {
            Some(unpack_child_run(packed))
        }
    }

    #[inline]
    pub fn nu_children(&self) -> usize {
        self.child_run().map_or(0, |(_, n)| n as usize)
    }

    /// 子ノード範囲の公開（展開レースの決着点）
    ///
    /// 成功時は None、敗北時は勝者の範囲を返す。
    pub(crate) fn try_link_children(&self, first: u32, count: u16) -> Option<(u32, u16)> {
        match self.child_run.compare_exchange(
            NO_CHILDREN,
            pack_child_run(first, count),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => None,
            Err(winner) => Some(unpack_child_run(winner)),
        }
    }

    /// 排他アクセス時の子ノード範囲設定（コピー先ツリー用）
    pub(crate) fn set_child_run(&self, first: u32, count: u16) {
        self.child_run
            .store(pack_child_run(first, count), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_run_pack() {
        let (first, count) = unpack_child_run(pack_child_run(123_456, 789));
        assert_eq!(first, 123_456);
        assert_eq!(count, 789);
    }

    #[test]
    fn test_add_value_mean() {
        let n = Node::new();
        n.init(Move::new(1), 0.0, 0.0);
        for v in [1.0, 0.0, 1.0, 1.0] {
            n.add_value(v);
        }
        assert_eq!(n.value_count(), 4.0);
        assert!((n.value() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_add_value_remove_loss() {
        let n = Node::new();
        n.init(Move::new(1), 0.0, 0.0);
        n.add_value(1.0);
        // 仮想敗北を加えてから実結果 1.0 で置き換える
        n.add_value(0.0);
        n.add_value_remove_loss(1.0);
        assert_eq!(n.value_count(), 2.0);
        assert!((n.value() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_link_children_race() {
        let n = Node::new();
        n.init(Move::new(1), 0.0, 0.0);
        assert!(n.try_link_children(10, 3).is_none());
        // 2 回目の展開は敗北し勝者の範囲を受け取る
        assert_eq!(n.try_link_children(20, 5), Some((10, 3)));
        assert_eq!(n.child_run(), Some((10, 3)));
    }

    #[test]
    fn test_clear_values_keeps_visits() {
        let n = Node::new();
        n.init(Move::new(7), 0.5, 2.0);
        n.inc_visit_count();
        n.add_rave_value(1.0, 0.5);
        n.clear_values();
        assert_eq!(n.visit_count(), 1.0);
        assert_eq!(n.value_count(), 0.0);
        assert_eq!(n.rave_count(), 0.0);
        assert_eq!(n.get_move(), Move::new(7));
    }
}
