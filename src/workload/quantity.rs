//! Kubernetes resource quantity syntax
//!
//! `<sign><digits>[.<digits>]<suffix>` where the suffix is a binary SI unit
//! (`Ki`..`Ei`), a decimal SI unit (`n u m k M G T P E`) or a decimal exponent
//! (`e3`, `E-2`).

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const BINARY_SUFFIXES: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: [&str; 9] = ["n", "u", "m", "k", "M", "G", "T", "P", "E"];

/// Parse `input` into a [`Quantity`], rejecting anything the API server would
pub fn parse_quantity(input: &str) -> Result<Quantity, String> {
    if input.is_empty() {
        return Err("quantity is empty".to_string());
    }

    let unsigned = input
        .strip_prefix('+')
        .or_else(|| input.strip_prefix('-'))
        .unwrap_or(input);

    let number_len = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_len);

    if !is_number(number) {
        return Err(format!("{:?} is not a valid quantity", input));
    }
    if !is_suffix(suffix) {
        return Err(format!(
            "{:?} has an unknown unit suffix {:?}",
            input, suffix
        ));
    }

    Ok(Quantity(input.to_string()))
}

fn is_number(number: &str) -> bool {
    let dots = number.matches('.').count();
    let digits = number.chars().filter(|c| c.is_ascii_digit()).count();
    dots <= 1 && digits > 0
}

fn is_suffix(suffix: &str) -> bool {
    if suffix.is_empty() || BINARY_SUFFIXES.contains(&suffix) || DECIMAL_SUFFIXES.contains(&suffix)
    {
        return true;
    }

    // Decimal exponent
    let Some(exponent) = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))
    else {
        return false;
    };
    let digits = exponent
        .strip_prefix('+')
        .or_else(|| exponent.strip_prefix('-'))
        .unwrap_or(exponent);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
