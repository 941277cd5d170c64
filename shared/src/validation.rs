//! Validation utilities for the retail POS platform

use rust_decimal::Decimal;

// ============================================================================
// Catalog Validations
// ============================================================================

/// Validate SKU format (3-32 chars, uppercase alphanumeric and dashes)
pub fn validate_sku(sku: &str) -> Result<(), &'static str> {
    if sku.len() < 3 {
        return Err("SKU must be at least 3 characters");
    }
    if sku.len() > 32 {
        return Err("SKU must be at most 32 characters");
    }
    if !sku
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("SKU must contain only uppercase letters, digits and dashes");
    }
    if sku.starts_with('-') || sku.ends_with('-') {
        return Err("SKU cannot start or end with a dash");
    }
    Ok(())
}

/// Normalise user-entered SKUs before validation
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_ascii_uppercase()
}

/// Validate barcode (8-14 digits, covers EAN-8, UPC-A, EAN-13 and GTIN-14)
pub fn validate_barcode(barcode: &str) -> Result<(), &'static str> {
    if !(8..=14).contains(&barcode.len()) {
        return Err("Barcode must be 8 to 14 digits");
    }
    if !barcode.chars().all(|c| c.is_ascii_digit()) {
        return Err("Barcode must contain digits only");
    }
    Ok(())
}

/// Validate a GS1 check digit (EAN-8, UPC-A, EAN-13, GTIN-14)
pub fn has_valid_check_digit(barcode: &str) -> bool {
    let digits: Vec<u32> = barcode.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != barcode.len() || digits.len() < 8 {
        return false;
    }

    let (body, check) = digits.split_at(digits.len() - 1);
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d * 3 } else { *d })
        .sum();
    (10 - sum % 10) % 10 == check[0]
}

/// Validate a price is non-negative with at most two decimal places
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Price cannot be negative");
    }
    if price.normalize().scale() > 2 {
        return Err("Price must have at most two decimal places");
    }
    Ok(())
}

/// Selling below cost is allowed but callers may want to warn
pub fn is_below_cost(cost_price: Decimal, selling_price: Decimal) -> bool {
    selling_price < cost_price
}

/// Validate a tax rate expressed as a fraction (0.0 to 1.0)
pub fn validate_tax_rate(rate: Decimal) -> Result<(), &'static str> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err("Tax rate must be between 0 and 1");
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err("Invalid email format");
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.')
    {
        return Err("Invalid email format");
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit");
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain at least one letter");
    }
    Ok(())
}

/// Validate a required free-text field is present and within length
pub fn validate_required_text(value: &str, max_len: usize) -> Result<(), &'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("Value is required");
    }
    if trimmed.chars().count() > max_len {
        return Err("Value is too long");
    }
    Ok(())
}
