//! DNA sequence utilities.
//!
//! This module provides common sequence operations like reverse complement
//! used by the classifiers, the pairing engine, and the stereo encoder.

/// Complements a single DNA base, normalizing to uppercase.
///
/// Returns the Watson-Crick complement: A<->T, C<->G. `U` complements to `A`
/// so RNA basecalls round-trip. Bases without a defined complement (`N`,
/// IUPAC wobble codes) are returned unchanged.
#[inline]
#[must_use]
pub const fn complement_base(base: u8) -> u8 {
    match base {
        b'A' | b'a' => b'T',
        b'T' | b't' | b'U' | b'u' => b'A',
        b'C' | b'c' => b'G',
        b'G' | b'g' => b'C',
        _ => base,
    }
}

/// Reverse complements a DNA sequence.
///
/// # Examples
///
/// ```
/// use lamprey_lib::dna::reverse_complement;
///
/// assert_eq!(reverse_complement(b"ACGT"), b"ACGT".to_vec());
/// assert_eq!(reverse_complement(b"AAGAAA"), b"TTTCTT".to_vec());
/// assert_eq!(reverse_complement(b"ACGTN"), b"NACGT".to_vec());
/// ```
#[must_use]
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&base| complement_base(base)).collect()
}

/// Counts the trailing occurrences of `base` in `seq`.
///
/// Used to discount primer bases that read as part of a polyA/T tail.
#[must_use]
pub fn trailing_base_count(seq: &[u8], base: u8) -> usize {
    seq.iter().rev().take_while(|&&b| b == base).count()
}
