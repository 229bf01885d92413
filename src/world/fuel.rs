//! Fuel for the interpreter

#[derive(Debug, Clone)]
pub struct Fuel {
    fuel: i32,
}

impl Fuel {
    pub fn with(fuel: i32) -> Self {
        Self { fuel }
    }

    /// Subtract from the current remaining fuel.
    ///
    /// Fuel may go negative, a charge is never refused halfway.
    pub fn consume(&mut self, fuel: i32) {
        self.fuel = self.fuel.saturating_sub(fuel);
    }

    pub fn remaining(&self) -> i32 {
        self.fuel
    }

    /// Replaces whatever is left, debt included.
    pub fn set_remaining(&mut self, fuel: i32) {
        self.fuel = fuel;
    }

    /// Returns true if we have positive fuel remaining
    pub fn should_continue(&self) -> bool {
        self.fuel > 0
    }
}

pub(crate) fn count_fuel(per_item: i32, count: usize) -> i32 {
    i32::try_from(count)
        .unwrap_or(i32::MAX)
        .saturating_mul(per_item)
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::{count_fuel, Fuel};

    #[test]
    fn consume_until_empty() {
        let mut fuel = Fuel::with(3);
        check!(fuel.should_continue());
        fuel.consume(2);
        check!(fuel.remaining() == 1);
        fuel.consume(1);
        check!(!fuel.should_continue());
    }

    #[test]
    fn set_remaining_clears_debt() {
        let mut fuel = Fuel::with(5);
        fuel.consume(9);
        check!(fuel.remaining() == -4);
        fuel.set_remaining(6);
        check!(fuel.remaining() == 6);
        fuel.consume(i32::MAX);
        fuel.consume(i32::MAX);
        check!(fuel.remaining() == i32::MIN);
    }

    #[test]
    fn counting_saturates() {
        check!(count_fuel(2, 3) == 6);
        check!(count_fuel(i32::MAX, 2) == i32::MAX);
        check!(count_fuel(1, usize::MAX) == i32::MAX);
    }
}
