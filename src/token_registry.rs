//! Well-known mint metadata (spec §4.4 "keyed by symbol-to-id map"): the small set of mints
//! ingestion sees often enough to resolve a symbol and a historical-provider id without a
//! dedicated metadata service. Unknown mints fall back to the mint address itself as symbol.

use std::collections::HashMap;

/// `(mint, symbol, coingecko-style id)`.
const KNOWN_MINTS: &[(&str, &str, &str)] = &[
    ("So11111111111111111111111111111111111111112", "SOL", "solana"),
    ("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "USDC", "usd-coin"),
    ("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", "USDT", "tether"),
    ("JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN", "JUP", "jupiter-exchange-solana"),
    ("mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So", "MSOL", "msol"),
    ("7dHbWXmci3dT8UFYWYZweBLXgycu7Y3iL6trKn1Y7ARj", "STSOL", "lido-staked-sol"),
];

pub fn symbol_for_mint(mint: &str) -> String {
    KNOWN_MINTS
        .iter()
        .find(|(m, _, _)| *m == mint)
        .map(|(_, symbol, _)| symbol.to_string())
        .unwrap_or_else(|| mint.to_string())
}

pub fn symbol_to_id_map() -> HashMap<String, String> {
    KNOWN_MINTS
        .iter()
        .map(|(_, symbol, id)| (symbol.to_string(), id.to_string()))
        .collect()
}

pub const NATIVE_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_mint_resolves_to_its_symbol() {
        assert_eq!(symbol_for_mint("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"), "USDC");
    }

    #[test]
    fn unknown_mint_falls_back_to_the_mint_address() {
        assert_eq!(symbol_for_mint("unknownmint"), "unknownmint");
    }
}
