use quarry_core::annotated::AnnotatedValue;
use quarry_core::expr::Expr;
use quarry_core::Result;

/// Stable, order-preserving encoding of the GROUP BY values of `item`.
///
/// Values are encoded in key order and joined as an array string; an empty
/// key list is the single implicit group `""`. Equal values (`8` and `8.0`)
/// encode identically and MISSING never collides with NULL.
pub fn group_key(keys: &[Expr], item: &AnnotatedValue) -> Result<String> {
    if keys.is_empty() {
        return Ok(String::new());
    }
    let mut out = String::with_capacity(16 * keys.len());
    out.push('[');
    for (i, k) in keys.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        k.evaluate(item)?.write_key(&mut out);
    }
    out.push(']');
    Ok(out)
}
