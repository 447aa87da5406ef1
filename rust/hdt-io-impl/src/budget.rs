//! Byte budget shared by every allocation of a temporary store.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Represents a budget that can be allocated from.
#[derive(Clone)]
pub struct Budget(Arc<BudgetState>);

struct BudgetState {
    capacity: u64,
    used: AtomicU64,
}

impl Budget {
    pub fn new(capacity: u64) -> Budget {
        Budget(Arc::new(BudgetState {
            capacity,
            used: AtomicU64::new(0),
        }))
    }

    /// Returns the remaining amount in this budget.
    ///
    /// **Note**: the value may be outdated in a concurrent environment.
    pub fn remaining(&self) -> u64 {
        self.0
            .capacity
            .saturating_sub(self.0.used.load(Ordering::Relaxed))
    }

    /// Attempts to allocate the specified amount from the budget.
    ///
    /// The allocated amount is returned to the budget when the `Allocation`
    /// is dropped.
    pub fn allocate(&self, amount: u64) -> std::io::Result<Allocation> {
        self.0.take(amount)?;
        Ok(Allocation {
            budget: self.0.clone(),
            amount,
        })
    }
}

impl BudgetState {
    fn take(&self, amount: u64) -> std::io::Result<()> {
        let mut used = self.used.load(Ordering::Relaxed);
        loop {
            let next = used.saturating_add(amount);
            if next > self.capacity {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::StorageFull,
                    format!(
                        "temporary storage budget exhausted: requested {amount}, remaining {}",
                        self.capacity.saturating_sub(used)
                    ),
                ));
            }
            match self.used.compare_exchange_weak(
                used,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(current) => used = current,
            }
        }
    }

    fn release(&self, amount: u64) {
        self.used.fetch_sub(amount, Ordering::AcqRel);
    }
}

/// Represents an allocation from a budget.
pub struct Allocation {
    budget: Arc<BudgetState>,
    amount: u64,
}

impl Allocation {
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Grows the allocation so that it covers at least `size` bytes.
    pub fn ensure(&mut self, size: u64) -> std::io::Result<()> {
        if size > self.amount {
            self.budget.take(size - self.amount)?;
            self.amount = size;
        }
        Ok(())
    }

    pub fn shrink_to(&mut self, amount: u64) {
        if amount < self.amount {
            self.budget.release(self.amount - amount);
            self.amount = amount;
        }
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if self.amount != 0 {
            self.budget.release(self.amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Budget;

    #[test]
    fn test_allocation_lifecycle() {
        let budget = Budget::new(1000);
        let mut a = budget.allocate(100).unwrap();
        assert_eq!(budget.remaining(), 900);
        a.ensure(600).unwrap();
        assert_eq!(budget.remaining(), 400);
        assert!(budget.allocate(500).is_err());
        a.shrink_to(50);
        assert_eq!(budget.remaining(), 950);
        drop(a);
        assert_eq!(budget.remaining(), 1000);
    }

    #[test]
    fn test_failed_growth_keeps_amount() {
        let budget = Budget::new(10);
        let mut a = budget.allocate(4).unwrap();
        let err = a.ensure(11).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::StorageFull);
        assert_eq!(a.amount(), 4);
        assert_eq!(budget.remaining(), 6);
    }
}
