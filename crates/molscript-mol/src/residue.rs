//! Residue-name classification used by the predefined atom sets
//!
//! `protein`, `nucleic`, `solvent`, `ions` and friends are resolved from the
//! residue name alone; the tables below are compile-time perfect hashes.

use phf::{phf_map, phf_set};

/// Amino acids to one-letter codes (standard and common variants)
static AMINO_ACIDS: phf::Map<&'static str, char> = phf_map! {
    "ALA" => 'A', "ARG" => 'R', "ASN" => 'N', "ASP" => 'D', "CYS" => 'C',
    "GLN" => 'Q', "GLU" => 'E', "GLY" => 'G', "HIS" => 'H', "ILE" => 'I',
    "LEU" => 'L', "LYS" => 'K', "MET" => 'M', "PHE" => 'F', "PRO" => 'P',
    "SER" => 'S', "THR" => 'T', "TRP" => 'W', "TYR" => 'Y', "VAL" => 'V',
    "HID" => 'H', "HIE" => 'H', "HIP" => 'H', "HSD" => 'H', "HSE" => 'H',
    "CYX" => 'C', "MSE" => 'M', "SEC" => 'U', "PYL" => 'O', "ASX" => 'B',
    "GLX" => 'Z', "UNK" => 'X',
};

/// Nucleotides to one-letter codes; a leading D marks deoxyribose
static NUCLEOTIDES: phf::Map<&'static str, char> = phf_map! {
    "A" => 'A', "C" => 'C', "G" => 'G', "U" => 'U', "I" => 'I', "T" => 'T',
    "DA" => 'A', "DC" => 'C', "DG" => 'G', "DT" => 'T', "DI" => 'I', "DU" => 'U',
    "ADE" => 'A', "CYT" => 'C', "GUA" => 'G', "THY" => 'T', "URA" => 'U',
    "PSU" => 'U', "5MC" => 'C', "OMG" => 'G', "7MG" => 'G',
};

static WATER_NAMES: phf::Set<&'static str> = phf_set! {
    "HOH", "WAT", "H2O", "DOD", "TIP", "TIP3", "SPC", "SOL",
};

static ION_NAMES: phf::Set<&'static str> = phf_set! {
    "NA", "K", "CA", "MG", "ZN", "FE", "FE2", "CU", "MN", "NI", "CO", "CD",
    "LI", "CS", "BA", "SR", "CL", "BR", "IOD", "SOD", "POT", "CLA",
};

/// Atom names making up the peptide or nucleic-acid backbone
static BACKBONE_NAMES: phf::Set<&'static str> = phf_set! {
    "N", "CA", "C", "O", "OXT", "H", "HA",
    "P", "OP1", "OP2", "O1P", "O2P", "O5'", "C5'", "C4'", "C3'", "O3'",
};

pub fn is_amino_acid(resn: &str) -> bool {
    AMINO_ACIDS.contains_key(resn)
}

pub fn is_nucleotide(resn: &str) -> bool {
    NUCLEOTIDES.contains_key(resn)
}

/// DNA residues carry the `D` prefix or are thymine
pub fn is_dna(resn: &str) -> bool {
    is_nucleotide(resn) && (resn.starts_with('D') || resn == "T" || resn == "THY")
}

pub fn is_rna(resn: &str) -> bool {
    is_nucleotide(resn) && !is_dna(resn)
}

pub fn is_water(resn: &str) -> bool {
    WATER_NAMES.contains(resn)
}

pub fn is_ion(resn: &str) -> bool {
    ION_NAMES.contains(resn)
}

pub fn is_backbone_name(name: &str) -> bool {
    BACKBONE_NAMES.contains(name)
}

/// One-letter code for a residue name, amino acids first
pub fn one_letter_code(resn: &str) -> Option<char> {
    AMINO_ACIDS
        .get(resn)
        .or_else(|| NUCLEOTIDES.get(resn))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(is_amino_acid("ALA"));
        assert!(!is_amino_acid("HOH"));
        assert!(is_water("HOH"));
        assert!(is_ion("ZN"));
        assert!(is_dna("DA"));
        assert!(is_rna("A"));
        assert!(!is_dna("U"));
    }

    #[test]
    fn test_one_letter_code() {
        assert_eq!(one_letter_code("TRP"), Some('W'));
        assert_eq!(one_letter_code("DG"), Some('G'));
        assert_eq!(one_letter_code("XYZ"), None);
    }

    #[test]
    fn test_backbone_names() {
        assert!(is_backbone_name("CA"));
        assert!(is_backbone_name("O3'"));
        assert!(!is_backbone_name("CB"));
    }
}
