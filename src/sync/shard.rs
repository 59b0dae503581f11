//! 执行分片标识
//!
//! 内核中通过关中断（`push_off`/`pop_off`）阻止迁移，再读取 `cpuid()`。
//! 宿主环境下每个线程在首次使用时按轮转分配一个分片号，此后固定不变，
//! 因此 [`ShardPin`] 只需在进入时读取一次分片号，不必真正阻止调度。
//!
//! 分片号只决定使用哪个空闲链表：每个链表都有自己的锁，
//! 读到过期的分片号只影响负载均衡，不影响正确性。

use core::cell::Cell;
use core::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD: Cell<Option<usize>> = const { Cell::new(None) };
}

fn raw_shard() -> usize {
    SHARD.with(|shard| match shard.get() {
        Some(id) => id,
        None => {
            let id = NEXT_SHARD.fetch_add(1, Ordering::Relaxed);
            shard.set(Some(id));
            id
        }
    })
}

/// 当前线程所属分片（取模到 `nshards`）
///
/// 只有在 [`ShardPin`] 存续期间读取才保证稳定。
pub fn current_shard(nshards: usize) -> usize {
    raw_shard() % nshards.max(1)
}

/// 在指定分片上执行闭包
///
/// 闭包结束（包括 panic）后恢复线程原来的分片。
pub fn with_shard<R>(id: usize, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<usize>);

    impl Drop for Restore {
        fn drop(&mut self) {
            SHARD.with(|shard| shard.set(self.0));
        }
    }

    let _restore = Restore(SHARD.with(|shard| shard.replace(Some(id))));
    f()
}

/// 分片固定守卫
///
/// 对应 `push_off()` + `cpuid()`。可以嵌套。
/// 守卫不能跨线程移动，持有期间 [`ShardPin::id`] 不变。
pub struct ShardPin {
    id: usize,
    _not_send: PhantomData<*const ()>,
}

impl ShardPin {
    /// 固定当前分片
    pub fn enter(nshards: usize) -> Self {
        Self {
            id: current_shard(nshards),
            _not_send: PhantomData,
        }
    }

    /// 固定期间的分片号
    pub fn id(&self) -> usize {
        self.id
    }
}

impl core::fmt::Debug for ShardPin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShardPin").field("id", &self.id).finish()
    }
}
