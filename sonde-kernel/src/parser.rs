/**
 * PARSER DE TRAMES - Décodage des trames texte émises par les capteurs
 *
 * RÔLE :
 * Transforme une trame brute ("stm32/1 Temperature1: 22.10 C, ...") en
 * identifiant de device + liste de mises à jour de champs typées.
 *
 * FONCTIONNEMENT :
 * - Découpage en lignes (\r\n, \n ou \r), lignes vides ignorées
 * - L'identifiant = premier token de la première ligne ("/" remplacé par "_"),
 *   repli sur "default" si la ligne ne contient aucun espace
 * - Chaque ligne est redécoupée en segments sur ", " puis chaque segment
 *   est reconnu via la table de labels FIELD_TABLE
 * - Segments inconnus ou valeurs malformées : ignorés silencieusement
 *
 * UTILITÉ DANS SONDE :
 * Seul point de contact avec le format texte des capteurs ; le registre ne
 * manipule que des FieldUpdate typés.
 */

/// Identifiant utilisé quand la première ligne ne permet pas d'en extraire un
pub const DEFAULT_DEVICE_ID: &str = "default";

/// Mise à jour d'un champ du snapshot, déjà typée par le parsing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldUpdate {
    Temperature1(f64),
    Humidity1(f64),
    Temperature2(f64),
    Humidity2(f64),
    RelayStatus(i64),
    Pb8Level(i64),
}

/// Champs capteur reconnus par le protocole trame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SensorField {
    Temperature1,
    Humidity1,
    Temperature2,
    Humidity2,
    RelayStatus,
    Pb8Level,
}

impl SensorField {
    /// Parse le token de valeur selon le type attendu par le champ
    fn parse_value(self, token: &str) -> Option<FieldUpdate> {
        match self {
            SensorField::Temperature1 => token.parse().ok().map(FieldUpdate::Temperature1),
            SensorField::Humidity1 => token.parse().ok().map(FieldUpdate::Humidity1),
            SensorField::Temperature2 => token.parse().ok().map(FieldUpdate::Temperature2),
            SensorField::Humidity2 => token.parse().ok().map(FieldUpdate::Humidity2),
            SensorField::RelayStatus => token.parse().ok().map(FieldUpdate::RelayStatus),
            SensorField::Pb8Level => token.parse().ok().map(FieldUpdate::Pb8Level),
        }
    }
}

// Table label → champ : documente le protocole et évite la chaîne de if/else.
// Les labels sont des préfixes sensibles à la casse, unité de fin ignorée.
const FIELD_TABLE: &[(&str, SensorField)] = &[
    ("Temperature1:", SensorField::Temperature1),
    ("Humidity1:", SensorField::Humidity1),
    ("Temperature2:", SensorField::Temperature2),
    ("Humidity2:", SensorField::Humidity2),
    ("Relay Status:", SensorField::RelayStatus),
    ("PB8 Level:", SensorField::Pb8Level),
];

/// Résultat du parsing d'une trame complète
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    pub device_id: String,
    /// Mises à jour dans l'ordre de la trame (un label en double : le dernier gagne)
    pub updates: Vec<FieldUpdate>,
}

impl ParsedFrame {
    /// Au moins un champ reconnu ? Sinon le caller ne doit pas avancer la liveness.
    pub fn parsed_any(&self) -> bool {
        !self.updates.is_empty()
    }
}

/// Parse une trame brute en (device id, mises à jour de champs)
pub fn parse_frame(raw: &str) -> ParsedFrame {
    let mut lines = raw
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty());

    let Some(first) = lines.next() else {
        return ParsedFrame {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            updates: Vec::new(),
        };
    };

    // Le device id précède le premier espace ; le reste de la ligne est la
    // première portion de données. Sans espace, la ligne entière est consommée.
    let (device_id, first_data) = match first.split_once(char::is_whitespace) {
        Some((token, rest)) => (token.replace('/', "_"), rest),
        None => (DEFAULT_DEVICE_ID.to_string(), ""),
    };

    let mut updates = Vec::new();
    for line in std::iter::once(first_data).chain(lines) {
        // une ligne peut porter deux valeurs labellisées jointes par ", "
        for segment in line.split(", ") {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            if let Some(update) = parse_segment(segment) {
                updates.push(update);
            }
        }
    }

    ParsedFrame { device_id, updates }
}

/// Reconnaît un segment via la table de labels ; None = segment ignoré
fn parse_segment(segment: &str) -> Option<FieldUpdate> {
    for (label, field) in FIELD_TABLE {
        let Some(rest) = segment.strip_prefix(label) else {
            continue;
        };
        // premier token après le label ; l'unité de fin (C, %) est ignorée
        let token = rest.split_whitespace().next()?;
        return field.parse_value(token);
    }
    None
}
