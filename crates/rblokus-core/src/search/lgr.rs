//! Last-Good-Reply ヒューリスティック
//!
//! 勝ったシミュレーションで現れた (直前の手, 2 手前の手) への応手を
//! プレイヤーごとに固定サイズのハッシュテーブルへ記録し、playout の
//! 着手候補として最優先で試す。負けたら忘れる（LGRF）。エントリは
//! atomic な Move 1 つで、衝突は上書きで構わない。

use std::sync::atomic::{AtomicU16, Ordering};

use crate::types::{Color, Move};

/// Last-Good-Reply テーブル
///
/// level-2（直前 2 手をキー）と level-1（直前 1 手をキー）の 2 段を
/// 持ち、参照時は level-2 を先に引く。
#[derive(Debug)]
pub struct LastGoodReply {
    lgr1: Vec<AtomicU16>,
    lgr2: Vec<AtomicU16>,
    mask: usize,
}

impl LastGoodReply {
    /// `hash_table_size` は 1 段あたりのエントリ数（2 のべきに切り上げ）
    pub fn new(hash_table_size: usize) -> LastGoodReply {
        assert!(hash_table_size > 0);
        let size = hash_table_size.next_power_of_two();
        LastGoodReply {
            lgr1: (0..size).map(|_| AtomicU16::new(0)).collect(),
            lgr2: (0..size).map(|_| AtomicU16::new(0)).collect(),
            mask: size - 1,
        }
    }

    /// 全エントリをクリアする（後続でない新しい探索の開始時）
    pub fn clear(&self) {
        for e in &self.lgr1 {
            e.store(0, Ordering::Relaxed);
        }
        for e in &self.lgr2 {
            e.store(0, Ordering::Relaxed);
        }
    }

    #[inline]
    fn hash(player: Color, last: Move, second_last: Move) -> usize {
        let key = (player.index() as u64)
            | ((last.to_int() as u64) << 4)
            | ((second_last.to_int() as u64) << 24);
        // Fibonacci hashing
        (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as usize
    }

    #[inline]
    fn index1(&self, player: Color, last: Move) -> usize {
        Self::hash(player, last, Move::NULL) & self.mask
    }

    #[inline]
    fn index2(&self, player: Color, last: Move, second_last: Move) -> usize {
        Self::hash(player, last, second_last) & self.mask
    }

    /// 勝った応手を記録する
    pub fn store(&self, player: Color, last: Move, second_last: Move, reply: Move) {
        debug_assert!(!reply.is_null());
        self.lgr1[self.index1(player, last)].store(reply.to_int(), Ordering::Relaxed);
        self.lgr2[self.index2(player, last, second_last)].store(reply.to_int(), Ordering::Relaxed);
    }

    /// 負けた応手を忘れる（同じ応手が残っている場合のみ）
    pub fn forget(&self, player: Color, last: Move, second_last: Move, reply: Move) {
        let _ = self.lgr1[self.index1(player, last)].compare_exchange(
            reply.to_int(),
            0,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
        let _ = self.lgr2[self.index2(player, last, second_last)].compare_exchange(
            reply.to_int(),
            0,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    /// 応手を引く（level-2 優先）
    pub fn lookup(&self, player: Color, last: Move, second_last: Move) -> Option<Move> {
        if last.is_null() {
            return None;
        }
        let reply2 = self.lgr2[self.index2(player, last, second_last)].load(Ordering::Relaxed);
        if reply2 != 0 {
            return Some(Move::new(reply2));
        }
        let reply1 = self.lgr1[self.index1(player, last)].load(Ordering::Relaxed);
        if reply1 != 0 {
            return Some(Move::new(reply1));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_lookup_forget() {
        let lgr = LastGoodReply::new(1 << 10);
        let p = Color::new(0);
        let (last, second) = (Move::new(10), Move::new(20));
        assert_eq!(lgr.lookup(p, last, second), None);
        lgr.store(p, last, second, Move::new(30));
        assert_eq!(lgr.lookup(p, last, second), Some(Move::new(30)));
        lgr.forget(p, last, second, Move::new(30));
        assert_eq!(lgr.lookup(p, last, second), None);
    }

    #[test]
    fn test_forget_keeps_newer_reply() {
        let lgr = LastGoodReply::new(1 << 10);
        let p = Color::new(1);
        let (last, second) = (Move::new(5), Move::new(6));
        lgr.store(p, last, second, Move::new(7));
        lgr.store(p, last, second, Move::new(8));
        // 古い応手の forget は新しいエントリを消さない
        lgr.forget(p, last, second, Move::new(7));
        assert_eq!(lgr.lookup(p, last, second), Some(Move::new(8)));
    }

    #[test]
    fn test_level1_fallback() {
        let lgr = LastGoodReply::new(1 << 10);
        let p = Color::new(0);
        lgr.store(p, Move::new(10), Move::new(20), Move::new(30));
        // 2 手前が違っても level-1 で引ける
        assert_eq!(lgr.lookup(p, Move::new(10), Move::new(99)), Some(Move::new(30)));
    }

    #[test]
    fn test_null_last_has_no_reply() {
        let lgr = LastGoodReply::new(1 << 10);
        assert_eq!(lgr.lookup(Color::new(0), Move::NULL, Move::NULL), None);
    }

    #[test]
    fn test_clear() {
        let lgr = LastGoodReply::new(1 << 8);
        let p = Color::new(0);
        lgr.store(p, Move::new(1), Move::new(2), Move::new(3));
        lgr.clear();
        assert_eq!(lgr.lookup(p, Move::new(1), Move::new(2)), None);
    }
}
