use std::collections::BTreeMap;

const KNOWN_TAXA: &[(u32, &str)] = &[
    (562, "Escherichia coli"),
    (1639, "Listeria monocytogenes"),
    (3702, "Arabidopsis thaliana"),
    (4530, "Oryza sativa"),
    (4577, "Zea mays"),
    (4932, "Saccharomyces cerevisiae"),
    (6239, "Caenorhabditis elegans"),
    (7091, "Bombyx mori"),
    (7159, "Aedes aegypti"),
    (7160, "Aedes albopictus"),
    (7165, "Anopheles gambiae"),
    (7176, "Culex quinquefasciatus"),
    (7227, "Drosophila melanogaster"),
    (7460, "Apis mellifera"),
    (7955, "Danio rerio"),
    (9606, "Homo sapiens"),
    (9913, "Bos taurus"),
    (10090, "Mus musculus"),
    (10116, "Rattus norvegicus"),
    (13443, "Coffea arabica"),
    (28901, "Salmonella enterica"),
    (220462, "Leymus arenarius"),
];

/// Taxid to species name lookup: built-in table plus configured entries.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    extra: BTreeMap<u32, String>,
}

impl Taxonomy {
    pub fn new(extra: BTreeMap<u32, String>) -> Self {
        Self { extra }
    }

    pub fn species(&self, taxid: u32) -> String {
        if let Some(name) = self.extra.get(&taxid) {
            return name.clone();
        }
        KNOWN_TAXA
            .binary_search_by_key(&taxid, |(id, _)| *id)
            .map(|index| KNOWN_TAXA[index].1.to_string())
            .unwrap_or_else(|_| format!("Unknown species (taxid {taxid})"))
    }
}
