use fastnum::UD128;

/// Amount field the user edited last; it is authoritative and the other
/// one is derived from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EditedField {
    #[default]
    Sell,
    Buy,
}

/// Swap being composed in the UI session. Never persisted.
#[derive(Clone, derive_more::Debug)]
pub struct SwapIntent {
    pub sell_symbol: String,
    pub buy_symbol: String,
    /// User-facing decimal string, may be empty or invalid while typing.
    pub sell_amount: String,
    pub buy_amount: String,
    /// Tolerated slippage, in percent (`0.5` means 0.5%).
    #[debug("{slippage_pct}")]
    pub slippage_pct: UD128,
    pub last_edited: EditedField,
}

impl SwapIntent {
    pub fn new(sell_symbol: impl Into<String>, buy_symbol: impl Into<String>, slippage_pct: UD128) -> Self {
        Self {
            sell_symbol: sell_symbol.into(),
            buy_symbol: buy_symbol.into(),
            sell_amount: String::new(),
            buy_amount: String::new(),
            slippage_pct,
            last_edited: EditedField::Sell,
        }
    }

    /// Records an edit of the sell amount.
    pub fn edit_sell(&mut self, amount: impl Into<String>) {
        self.sell_amount = amount.into();
        self.last_edited = EditedField::Sell;
    }

    /// Records an edit of the buy amount.
    pub fn edit_buy(&mut self, amount: impl Into<String>) {
        self.buy_amount = amount.into();
        self.last_edited = EditedField::Buy;
    }

    /// Swaps sell and buy sides, keeping amounts attached to their tokens.
    pub fn flip(&mut self) {
        std::mem::swap(&mut self.sell_symbol, &mut self.buy_symbol);
        std::mem::swap(&mut self.sell_amount, &mut self.buy_amount);
        self.last_edited = match self.last_edited {
            EditedField::Sell => EditedField::Buy,
            EditedField::Buy => EditedField::Sell,
        };
    }
}
