//! 睡眠锁
//!
//! 保护缓冲块内容的阻塞锁。锁被占用时，获取者会让出 CPU 等待，
//! 适用于持有期间需要做设备 I/O 的场景。
//!
//! 与 `spin::Mutex` 不同，睡眠锁记录持有者线程，可以回答
//! “当前线程是否持有该锁”，用于检测调用方误用。
//!
//! 规则：持有任何自旋锁时不得获取睡眠锁。

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// 睡眠锁
pub struct SleepLock<T: ?Sized> {
    /// 持有者，`None` 表示空闲
    owner: Mutex<Option<ThreadId>>,
    cond: Condvar,
    name: &'static str,
    data: UnsafeCell<T>,
}

// 数据只在持有锁时被访问
unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    /// 创建睡眠锁
    pub fn new(data: T, name: &'static str) -> Self {
        Self {
            owner: Mutex::new(None),
            cond: Condvar::new(),
            name,
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    /// 获取锁，锁被占用时阻塞
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let mut owner = self.state();
        while owner.is_some() {
            owner = self
                .cond
                .wait(owner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *owner = Some(thread::current().id());
        drop(owner);

        SleepLockGuard {
            lock: self,
            _marker: PhantomData,
        }
    }

    /// 尝试获取锁，不阻塞
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        let mut owner = self.state();
        if owner.is_some() {
            return None;
        }
        *owner = Some(thread::current().id());
        drop(owner);

        Some(SleepLockGuard {
            lock: self,
            _marker: PhantomData,
        })
    }

    /// 当前线程是否持有该锁
    ///
    /// 对应 `holdingsleep`
    pub fn holding(&self) -> bool {
        *self.state() == Some(thread::current().id())
    }

    /// 锁是否被任意线程持有
    pub fn is_locked(&self) -> bool {
        self.state().is_some()
    }

    /// 锁名
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn unlock(&self) {
        let mut owner = self.state();
        *owner = None;
        drop(owner);
        self.cond.notify_one();
    }

    // 内部互斥量只在本模块中短暂持有，中毒时直接取回状态
    fn state(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: ?Sized> core::fmt::Debug for SleepLock<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SleepLock")
            .field("name", &self.name)
            .field("owner", &*self.state())
            .finish()
    }
}

/// 睡眠锁守卫，drop 时释放锁
pub struct SleepLockGuard<'a, T: ?Sized> {
    lock: &'a SleepLock<T>,
    _marker: PhantomData<&'a mut T>,
}

impl<T: ?Sized> SleepLockGuard<'_, T> {
    /// 当前线程是否为锁的持有者
    ///
    /// 守卫被移交到其他线程后返回 `false`。
    pub fn is_owner(&self) -> bool {
        self.lock.holding()
    }
}

impl<T: ?Sized> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 守卫存在期间锁处于占用状态
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 同上，且 `&mut self` 保证独占
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
