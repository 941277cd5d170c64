//! Fixed-width text rendering for thermal receipt printers
//!
//! Output is plain text; every line fits the paper width in characters so the
//! client can stream it to a 58mm or 80mm printer unchanged.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Sale, SaleStatus};

/// Supported paper widths, in characters per line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PaperWidth {
    /// 58mm roll
    Narrow,
    /// 80mm roll
    #[default]
    Wide,
}

impl PaperWidth {
    pub fn columns(&self) -> usize {
        match self {
            PaperWidth::Narrow => 32,
            PaperWidth::Wide => 48,
        }
    }

    pub fn from_columns(columns: usize) -> Option<Self> {
        match columns {
            32 => Some(PaperWidth::Narrow),
            48 => Some(PaperWidth::Wide),
            _ => None,
        }
    }
}

/// Store details printed in the receipt header and footer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreInfo {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub currency: String,
    pub footer: Option<String>,
}

/// Render a completed sale as receipt text
pub fn render_receipt(store: &StoreInfo, sale: &Sale, width: PaperWidth) -> String {
    let cols = width.columns();
    let mut out = ReceiptWriter::new(cols);

    out.center(&store.name.to_uppercase());
    if let Some(address) = &store.address {
        out.center(address);
    }
    if let Some(phone) = &store.phone {
        out.center(&format!("Tel: {}", phone));
    }
    out.rule('=');

    out.pair("Receipt:", &sale.receipt_number);
    out.pair("Date:", &sale.sold_at.format("%Y-%m-%d %H:%M").to_string());
    out.pair("Cashier:", &sale.cashier_name);
    if let Some(customer) = &sale.customer_name {
        out.pair("Customer:", customer);
    }
    out.rule('-');

    for line in &sale.lines {
        out.single(&line.product_name);
        let detail = format!("  {} x {}", line.quantity, money(line.unit_price));
        out.pair(&detail, &money(line.line_total));
    }
    out.rule('-');

    out.pair("Subtotal", &money(sale.subtotal));
    if sale.discount > Decimal::ZERO {
        out.pair("Discount", &format!("-{}", money(sale.discount)));
    }
    out.pair("Tax", &money(sale.tax));
    out.pair(
        &format!("TOTAL ({})", store.currency),
        &money(sale.total),
    );
    out.rule('-');
    out.pair(sale.payment_method.label(), &money(sale.amount_tendered));
    if sale.change_due > Decimal::ZERO {
        out.pair("Change", &money(sale.change_due));
    }

    if sale.status == SaleStatus::Voided {
        out.rule('*');
        out.center("*** VOIDED ***");
        if let Some(reason) = &sale.void_reason {
            out.center(reason);
        }
    }

    out.rule('=');
    out.center(store.footer.as_deref().unwrap_or("Thank you for shopping with us!"));
    out.finish()
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

/// Line-oriented writer that never exceeds the configured column count
struct ReceiptWriter {
    cols: usize,
    lines: Vec<String>,
}

impl ReceiptWriter {
    fn new(cols: usize) -> Self {
        Self {
            cols,
            lines: Vec::new(),
        }
    }

    /// One left-aligned line; anything past the paper width is cut off
    fn single(&mut self, text: &str) {
        self.lines.push(truncate(text.trim(), self.cols));
    }

    fn center(&mut self, text: &str) {
        for chunk in wrap(text, self.cols) {
            let len = chunk.chars().count();
            let pad = (self.cols - len) / 2;
            self.lines.push(format!("{}{}", " ".repeat(pad), chunk));
        }
    }

    /// Label on the left, value right-aligned. The label is truncated so the
    /// value always stays visible.
    fn pair(&mut self, label: &str, value: &str) {
        let value = truncate(value, self.cols);
        let value_len = value.chars().count();
        let room = self.cols.saturating_sub(value_len + 1);
        let label = truncate(label, room);
        let gap = self.cols - label.chars().count() - value_len;
        self.lines.push(format!("{}{}{}", label, " ".repeat(gap), value));
    }

    fn rule(&mut self, ch: char) {
        self.lines.push(std::iter::repeat(ch).take(self.cols).collect());
    }

    fn finish(self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn wrap(text: &str, cols: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();
        if current_len > 0 && current_len + 1 + word_len > cols {
            lines.push(std::mem::take(&mut current));
        }
        if word_len > cols {
            // hard-split words longer than a line
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(cols) {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                current = piece.iter().collect();
            }
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
