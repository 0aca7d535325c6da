//! 探索木（固定容量ノードアリーナ）
//!
//! ノードは連続配列に置き、子は (first, count) の連続範囲で参照する。
//! 成長はしない: 容量はメモリバジェットから決め、超過する展開は
//! 「tree full」として失敗させる（呼び出し側が枝刈りで回収する）。
//! 展開の競合を避けるため、空き領域はスレッドごとの区画に分割し、
//! 各スレッドは自分の区画のカーソルだけを進める。
//!
//! 並行性: 探索中はすべてのスレッドが統計フィールドを Relaxed で更新
//! する（更新ロス許容）。子範囲の公開だけが CAS。コピー系操作は
//! コーディネータスレッドが排他所有するツリーに対してのみ行う。

mod node;

pub use node::Node;

use smallvec::SmallVec;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::{Float, Move};

/// ノードインデックス
pub type NodeIdx = u32;

/// ルートノードのインデックス
pub const ROOT: NodeIdx = 0;

/// スレッドごとの空き領域区画
#[derive(Debug)]
struct ThreadStorage {
    begin: AtomicUsize,
    end: AtomicUsize,
    next: AtomicUsize,
}

/// 探索木
pub struct Tree {
    nodes: Box<[Node]>,
    nu_threads: usize,
    storages: Vec<ThreadStorage>,
}

impl Tree {
    /// ノードあたりのメモリ量（バジェット換算用）
    pub const NODE_SIZE: usize = std::mem::size_of::<Node>();

    pub fn new(max_nodes: usize, nu_threads: usize) -> Tree {
        assert!(nu_threads > 0);
        assert!(max_nodes > nu_threads);
        let nodes: Box<[Node]> = (0..max_nodes).map(|_| Node::new()).collect();
        let storages = (0..nu_threads)
            .map(|_| ThreadStorage {
                begin: AtomicUsize::new(0),
                end: AtomicUsize::new(0),
                next: AtomicUsize::new(0),
            })
            .collect();
        let tree = Tree {
            nodes,
            nu_threads,
            storages,
        };
        tree.clear(0.0);
        tree
    }

    #[inline]
    pub fn max_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn nu_threads(&self) -> usize {
        self.nu_threads
    }

    /// 単一ルートへ初期化する
    ///
    /// `root_init_value` は観測が付くまで `value()` が返す中立値。
    /// 探索停止中にのみ呼ぶこと。
    pub fn clear(&self, root_init_value: Float) {
        self.nodes[ROOT as usize].init(Move::NULL, root_init_value, 0.0);
        self.partition_free(1);
    }

    /// ノード `used` 以降の空き領域をスレッド区画に分割する
    fn partition_free(&self, used: usize) {
        debug_assert!(used >= 1 && used <= self.max_nodes());
        let free = self.max_nodes() - used;
        let chunk = free / self.nu_threads;
        for (t, s) in self.storages.iter().enumerate() {
            let begin = used + t * chunk;
            let end = if t == self.nu_threads - 1 {
                self.max_nodes()
            } else {
                begin + chunk
            };
            s.begin.store(begin, Ordering::Relaxed);
            s.end.store(end, Ordering::Relaxed);
            s.next.store(begin, Ordering::Relaxed);
        }
    }

    /// 使用中ノード数（探索中は近似値）
    pub fn nu_nodes(&self) -> usize {
        let mut n = self.storages[0].begin.load(Ordering::Relaxed);
        for s in &self.storages {
            n += s.next.load(Ordering::Relaxed) - s.begin.load(Ordering::Relaxed);
        }
        n
    }

    #[inline]
    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx as usize]
    }

    #[inline]
    pub fn root(&self) -> &Node {
        &self.nodes[ROOT as usize]
    }

    /// 子ノードのインデックス範囲
    #[inline]
    pub fn children(&self, idx: NodeIdx) -> std::ops::Range<NodeIdx> {
        match self.node(idx).child_run() {
            Some((first, count)) => first..first + count as u32,
            None => 0..0,
        }
    }

    /// 指し手列をたどってノードを探す（サブツリー再利用用）
    pub fn find_node(&self, sequence: &[Move]) -> Option<NodeIdx> {
        let mut idx = ROOT;
        for &mv in sequence {
            idx = self
                .children(idx)
                .find(|&i| self.node(i).get_move() == mv)?;
        }
        Some(idx)
    }

    /// スレッド区画から 1 ノード確保する
    fn alloc(&self, thread_id: usize) -> Option<NodeIdx> {
        let s = &self.storages[thread_id];
        let next = s.next.load(Ordering::Relaxed);
        if next >= s.end.load(Ordering::Relaxed) {
            None
        } else {
            // 自スレッド専用区画なので Relaxed store で足りる
            s.next.store(next + 1, Ordering::Relaxed);
            Some(next as NodeIdx)
        }
    }

    fn rollback(&self, thread_id: usize, n: usize) {
        let s = &self.storages[thread_id];
        let next = s.next.load(Ordering::Relaxed);
        debug_assert!(next - n >= s.begin.load(Ordering::Relaxed));
        s.next.store(next - n, Ordering::Relaxed);
    }

    // =========================================================================
    // 統計更新（ロックフリー）
    // =========================================================================

    #[inline]
    pub fn inc_visit_count(&self, idx: NodeIdx) {
        self.node(idx).inc_visit_count();
    }

    #[inline]
    pub fn add_value(&self, idx: NodeIdx, v: Float) {
        self.node(idx).add_value(v);
    }

    #[inline]
    pub fn add_value_remove_loss(&self, idx: NodeIdx, v: Float) {
        self.node(idx).add_value_remove_loss(v);
    }

    #[inline]
    pub fn add_rave_value(&self, idx: NodeIdx, v: Float, weight: Float) {
        self.node(idx).add_rave_value(v, weight);
    }

    // =========================================================================
    // コピー・抽出
    // =========================================================================

    /// `src` 以下のサブツリーを `dest` にコピーする
    ///
    /// visit_count が `min_visit_count` 未満のノード（ルートを除く）は
    /// 捨てる。`abort` が true を返したら中断し false を返す。中断しても
    /// `dest` は整合した（部分的な）ツリーのまま。
    pub fn copy_subtree(
        &self,
        dest: &Tree,
        src: NodeIdx,
        min_visit_count: Float,
        abort: &mut dyn FnMut() -> bool,
    ) -> bool {
        dest.root().copy_data_from(self.node(src));
        let mut next = 1usize;
        let complete = self.copy_children(dest, src, ROOT, &mut next, min_visit_count, abort);
        dest.partition_free(next);
        complete
    }

    /// 深いノードを新しいルートへ昇格して抽出する
    ///
    /// ルートの値（局面価値）と指し手の値は意味が異なるため、昇格後の
    /// ルートは値統計をクリアする（visit_count と子情報は保存）。
    pub fn extract_subtree(
        &self,
        dest: &Tree,
        src: NodeIdx,
        abort: &mut dyn FnMut() -> bool,
    ) -> bool {
        let complete = self.copy_subtree(dest, src, 0.0, abort);
        dest.root().clear_values();
        complete
    }

    fn copy_children(
        &self,
        dest: &Tree,
        src_idx: NodeIdx,
        dest_idx: NodeIdx,
        next: &mut usize,
        min_visit_count: Float,
        abort: &mut dyn FnMut() -> bool,
    ) -> bool {
        let keep: SmallVec<[NodeIdx; 64]> = self
            .children(src_idx)
            .filter(|&i| self.node(i).visit_count() >= min_visit_count)
            .collect();
        if keep.is_empty() {
            return true;
        }
        if *next + keep.len() > dest.max_nodes() {
            // コピー先の容量不足（容量の異なるツリーに対してのみ起こる）
            return false;
        }
        let dest_first = *next as NodeIdx;
        for (i, &si) in keep.iter().enumerate() {
            dest.nodes[dest_first as usize + i].copy_data_from(self.node(si));
        }
        *next += keep.len();
        // 子データを書き切ってから範囲を公開する
        dest.node(dest_idx).set_child_run(dest_first, keep.len() as u16);
        if abort() {
            return false;
        }
        for (i, &si) in keep.iter().enumerate() {
            if !self.copy_children(dest, si, dest_first + i as u32, next, min_visit_count, abort) {
                return false;
            }
        }
        true
    }

    /// ツリー記憶域の O(1) 交換
    pub fn swap(&mut self, other: &mut Tree) {
        std::mem::swap(self, other);
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("max_nodes", &self.max_nodes())
            .field("nu_nodes", &self.nu_nodes())
            .finish()
    }
}

// =============================================================================
// NodeExpander
// =============================================================================

/// リーフ展開の補助
///
/// 候補手を 1 つずつ子ノードとして確保し、最後に親へ CAS で公開する。
/// スレッド区画が尽きたら `is_tree_full` になり、呼び出し側は枝刈りを
/// 起動する。同じリーフを同時に展開しようとしたスレッドの敗者は確保分を
/// 巻き戻し、勝者の子をそのまま使う。
pub struct NodeExpander<'a> {
    tree: &'a Tree,
    thread_id: usize,
    first: NodeIdx,
    nu_children: u16,
    is_tree_full: bool,
    child_min_count: Float,
    best_value: Float,
    best_child: NodeIdx,
}

/// 展開の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// 公開成功（最良 prior の子、子なし=終端なら None）
    Linked(Option<NodeIdx>),
    /// 別スレッドが先に展開した（その最良の子を使う）
    Lost(Option<NodeIdx>),
    /// スレッド区画が尽きた
    TreeFull,
}

impl<'a> NodeExpander<'a> {
    pub fn new(tree: &'a Tree, thread_id: usize, child_min_count: Float) -> NodeExpander<'a> {
        NodeExpander {
            tree,
            thread_id,
            first: 0,
            nu_children: 0,
            is_tree_full: false,
            child_min_count,
            best_value: 0.0,
            best_child: 0,
        }
    }

    /// 候補手を子ノードとして追加する（prior の値とカウント付き）
    pub fn add_child(&mut self, mv: Move, value: Float, count: Float) {
        if self.is_tree_full {
            return;
        }
        debug_assert!((self.nu_children as usize) < u16::MAX as usize);
        let Some(idx) = self.tree.alloc(self.thread_id) else {
            self.is_tree_full = true;
            return;
        };
        let count = count.max(self.child_min_count);
        self.tree.node(idx).init(mv, value, count);
        if self.nu_children == 0 {
            self.first = idx;
            self.best_value = value;
            self.best_child = idx;
        } else {
            debug_assert_eq!(idx, self.first + self.nu_children as u32);
            if value > self.best_value {
                self.best_value = value;
                self.best_child = idx;
            }
        }
        self.nu_children += 1;
    }

    #[inline]
    pub fn is_tree_full(&self) -> bool {
        self.is_tree_full
    }

    #[inline]
    pub fn nu_children(&self) -> usize {
        self.nu_children as usize
    }

    /// 親ノードへ子範囲を公開する
    pub fn link_children(self, parent: NodeIdx) -> Expansion {
        if self.is_tree_full {
            self.tree.rollback(self.thread_id, self.nu_children as usize);
            return Expansion::TreeFull;
        }
        if self.nu_children == 0 {
            return Expansion::Linked(None);
        }
        match self
            .tree
            .node(parent)
            .try_link_children(self.first, self.nu_children)
        {
            None => Expansion::Linked(Some(self.best_child)),
            Some((first, count)) => {
                // 敗北: 確保分を巻き戻し、勝者の最良の子を返す
                self.tree.rollback(self.thread_id, self.nu_children as usize);
                let best = (first..first + count as u32)
                    .max_by(|&a, &b| {
                        self.tree
                            .node(a)
                            .value()
                            .partial_cmp(&self.tree.node(b).value())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                Expansion::Lost(best)
            }
        }
    }
}

// =============================================================================
// テスト
// =============================================================================
