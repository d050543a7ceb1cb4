//! Seed data: built-in question sets, the default resource catalog and a demo student.
//!
//! The backup sets guarantee an assessment can always be generated, even
//! without external config or OpenAI.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::domain::{
  AnswerValue, Difficulty, KnowledgeArea, Question, QuestionKind, QuestionOption, Resource, ResourceKind,
  ResourceSource, Student, Subject,
};

/// Fixed id of the demo student so it can be fetched without a registration round-trip.
pub const DEMO_STUDENT_ID: &str = "demo-student";

fn opts(pairs: &[(&str, &str)]) -> Vec<QuestionOption> {
  pairs.iter().map(|(id, text)| QuestionOption { id: (*id).into(), text: (*text).into() }).collect()
}

fn text(s: &str) -> AnswerValue {
  AnswerValue::Text(s.into())
}

fn seq(ids: &[&str]) -> AnswerValue {
  AnswerValue::Sequence(ids.iter().map(|s| (*s).to_string()).collect())
}

#[allow(clippy::too_many_arguments)]
fn question(
  id: &str,
  kind: QuestionKind,
  text_: &str,
  topic: &str,
  difficulty: Difficulty,
  points: u32,
  correct_answer: AnswerValue,
  options: Vec<QuestionOption>,
  explanation: &str,
) -> Question {
  Question {
    id: id.into(),
    text: text_.into(),
    kind,
    topic: topic.into(),
    difficulty,
    points,
    correct_answer,
    options,
    matches: Vec::new(),
    model_answer: None,
    explanation: explanation.into(),
  }
}

/// Curriculum topics per subject, used when a student has no recorded weaknesses.
pub fn curriculum_topics(subject: Subject) -> &'static [&'static str] {
  match subject {
    Subject::Historia => &[
      "Civilizaciones Mesoamericanas",
      "Conquista de América",
      "Período Colonial",
      "Independencia de América Latina",
      "Revolución Industrial",
      "Guerras Mundiales",
      "Guerra Fría",
      "Historia Contemporánea",
    ],
    Subject::Geografia => &[
      "Geografía Física de América",
      "Geografía Política de América",
      "Hidrografía",
      "Orografía",
      "Demografía",
      "Recursos Naturales",
      "Geografía Económica",
      "Cambio Climático",
    ],
  }
}

/// Built-in question set for `subject`, stamped with the requested difficulty.
pub fn backup_questions(subject: Subject, difficulty: Difficulty) -> Vec<Question> {
  let true_false = || opts(&[("a", "Verdadero"), ("b", "Falso")]);
  match subject {
    Subject::Historia => vec![
      question(
        "q1",
        QuestionKind::MultipleChoice,
        "¿Cuál de las siguientes civilizaciones se desarrolló primero?",
        "Historia Antigua",
        difficulty,
        10,
        text("d"),
        opts(&[("a", "Imperio Romano"), ("b", "Antigua Grecia"), ("c", "Egipto"), ("d", "Mesopotamia")]),
        "Mesopotamia es considerada la cuna de la civilización, desarrollándose antes que las demás opciones mencionadas.",
      ),
      question(
        "q2",
        QuestionKind::MultipleChoice,
        "¿En qué año comenzó la Segunda Guerra Mundial?",
        "Guerras Mundiales",
        difficulty,
        10,
        text("b"),
        opts(&[("a", "1914"), ("b", "1939"), ("c", "1941"), ("d", "1945")]),
        "La Segunda Guerra Mundial comenzó el 1 de septiembre de 1939 con la invasión alemana a Polonia.",
      ),
      question(
        "q3",
        QuestionKind::TrueFalse,
        "Los mayas desarrollaron avanzados sistemas de escritura y matemáticas.",
        "Civilizaciones Mesoamericanas",
        difficulty,
        10,
        text("a"),
        true_false(),
        "Los mayas desarrollaron un complejo sistema de escritura jeroglífica y un avanzado sistema matemático que incluía el concepto del cero.",
      ),
      Question {
        model_answer: Some(
          "El colapso de la civilización maya clásica (800-950 d.C.) fue provocado por una combinación de factores: \
           sequías prolongadas y cambio climático; presión demográfica y agotamiento de recursos; conflictos internos \
           y guerras entre ciudades-estado; colapso de las redes comerciales; y crisis en los sistemas políticos y religiosos."
            .into(),
        ),
        ..question(
          "q4",
          QuestionKind::OpenEnded,
          "Explique los principales factores que contribuyeron al colapso de la civilización maya clásica.",
          "Civilizaciones Mesoamericanas",
          difficulty,
          15,
          text(""),
          Vec::new(),
          "Una respuesta completa debe mencionar factores ambientales, sociopolíticos y económicos.",
        )
      },
      question(
        "q5",
        QuestionKind::Ordering,
        "Ordene cronológicamente los siguientes eventos de la Revolución Industrial:",
        "Revolución Industrial",
        difficulty,
        15,
        seq(&["a", "c", "b", "d"]),
        opts(&[
          ("a", "Invención de la máquina de vapor de Watt"),
          ("b", "Primera línea de ferrocarril público"),
          ("c", "Invención del telar mecánico"),
          ("d", "Primera fábrica con línea de montaje"),
        ]),
        "Máquina de vapor de Watt (1769), telar mecánico (1785), primer ferrocarril público (1825) y líneas de montaje (siglo XX).",
      ),
    ],
    Subject::Geografia => vec![
      question(
        "q1",
        QuestionKind::MultipleChoice,
        "¿Cuál es el río más largo de América del Sur?",
        "Hidrografía",
        difficulty,
        10,
        text("a"),
        opts(&[("a", "Amazonas"), ("b", "Paraná"), ("c", "Orinoco"), ("d", "Magdalena")]),
        "El río Amazonas es el río más largo y caudaloso de América del Sur.",
      ),
      question(
        "q2",
        QuestionKind::TrueFalse,
        "La Cordillera de los Andes recorre toda la costa occidental de América del Sur.",
        "Geografía de América",
        difficulty,
        10,
        text("a"),
        true_false(),
        "Los Andes atraviesan Venezuela, Colombia, Ecuador, Perú, Bolivia, Chile y Argentina.",
      ),
      Question {
        matches: opts(&[("1", "Buenos Aires"), ("2", "Brasilia"), ("3", "Bogotá"), ("4", "Lima")]),
        ..question(
          "q3",
          QuestionKind::Matching,
          "Relacione cada país con su capital:",
          "Geografía Política",
          difficulty,
          10,
          AnswerValue::Mapping(BTreeMap::from([
            ("a".to_string(), "2".to_string()),
            ("b".to_string(), "1".to_string()),
            ("c".to_string(), "3".to_string()),
            ("d".to_string(), "4".to_string()),
          ])),
          opts(&[("a", "Brasil"), ("b", "Argentina"), ("c", "Colombia"), ("d", "Perú")]),
          "Brasil - Brasilia, Argentina - Buenos Aires, Colombia - Bogotá, Perú - Lima.",
        )
      },
      Question {
        model_answer: Some(
          "El Canal de Panamá conecta los océanos Atlántico y Pacífico y reduce el tiempo y el costo del transporte \
           marítimo global. Facilita cerca del 6% del comercio marítimo mundial, ha sido un punto estratégico para \
           potencias como Estados Unidos, es vital para la economía panameña y funciona como nodo logístico de América Latina."
            .into(),
        ),
        ..question(
          "q4",
          QuestionKind::OpenEnded,
          "Explique la importancia del Canal de Panamá para el comercio mundial y la geopolítica regional.",
          "Geografía de América",
          difficulty,
          15,
          text(""),
          Vec::new(),
          "Una respuesta completa debe abordar aspectos económicos, geopolíticos y de conectividad global.",
        )
      },
      question(
        "q5",
        QuestionKind::Ordering,
        "Ordene los siguientes países de América Latina de mayor a menor población:",
        "Demografía",
        difficulty,
        15,
        seq(&["b", "a", "c", "d"]),
        opts(&[("a", "México"), ("b", "Brasil"), ("c", "Colombia"), ("d", "Argentina")]),
        "Brasil, México, Colombia y Argentina.",
      ),
    ],
  }
}

#[allow(clippy::too_many_arguments)]
fn resource(
  id: &str,
  title: &str,
  description: &str,
  kind: ResourceKind,
  subject: Subject,
  topics: &[&str],
  url: &str,
  difficulty: Difficulty,
  duration_minutes: u32,
) -> Resource {
  Resource {
    id: id.into(),
    title: title.into(),
    description: description.into(),
    kind,
    subject: Some(subject),
    topics: topics.iter().map(|t| (*t).to_string()).collect(),
    url: url.into(),
    difficulty,
    duration_minutes,
    source: ResourceSource::Catalog,
  }
}

/// Default learning catalog, loaded into the store at startup.
pub fn seed_resources() -> Vec<Resource> {
  use Difficulty::*;
  use ResourceKind::*;
  use Subject::*;
  vec![
    resource(
      "r-mesoamerica",
      "Civilizaciones Mesoamericanas: Un panorama general",
      "Lección sobre las principales culturas mesoamericanas y sus características distintivas.",
      Lesson, Historia, &["Civilizaciones Mesoamericanas", "Culturas Precolombinas"], "", Intermediate, 25,
    ),
    resource(
      "r-mesopotamia-egipto",
      "Historia Antigua: Mesopotamia y Egipto",
      "Estudio comparativo de las primeras grandes civilizaciones y su legado.",
      Lesson, Historia, &["Historia Antigua", "Civilizaciones Antiguas"], "", Basic, 30,
    ),
    resource(
      "r-revolucion-industrial",
      "La Revolución Industrial: Transformación Social y Económica",
      "Análisis de los factores y consecuencias de la industrialización.",
      Lesson, Historia, &["Revolución Industrial", "Historia Moderna"], "", Intermediate, 35,
    ),
    resource(
      "r-hidrografia",
      "Hidrografía Mundial: Principales Sistemas Fluviales",
      "Estudio de los grandes ríos y sistemas hidrográficos del mundo.",
      Lesson, Geografia, &["Hidrografía", "Geografía Física"], "", Basic, 25,
    ),
    resource(
      "r-geopolitica-latam",
      "Geografía Política de América Latina",
      "Análisis de las fronteras, divisiones políticas y relaciones entre los países latinoamericanos.",
      Lesson, Geografia, &["Geografía Política", "Geografía de América"], "", Intermediate, 30,
    ),
    resource(
      "r-demografia",
      "Demografía Mundial: Tendencias Actuales",
      "Análisis de la distribución poblacional, tendencias demográficas y desafíos poblacionales globales.",
      Lesson, Geografia, &["Demografía", "Geografía Humana"], "", Advanced, 40,
    ),
    resource(
      "r-video-mayas-aztecas",
      "Civilizaciones Mesoamericanas: Mayas y Aztecas",
      "Video documental sobre los avances científicos y culturales de mayas y aztecas.",
      Video, Historia, &["Civilizaciones Mesoamericanas", "Culturas Precolombinas"],
      "https://www.example.com/videos/civilizaciones-mesoamericanas", Basic, 15,
    ),
    resource(
      "r-video-sudamerica",
      "Geografía Física de América del Sur",
      "Video explicativo sobre las principales características geográficas de Sudamérica.",
      Video, Geografia, &["Geografía de América", "Geografía Física"],
      "https://www.example.com/videos/geografia-sudamerica", Basic, 12,
    ),
  ]
}

/// Demo student with a populated profile, handy for exploring recommendations.
pub fn demo_student() -> Student {
  let now = Utc::now();
  let area = |name: &str, proficiency: f64, strengths: &[&str], weaknesses: &[&str]| KnowledgeArea {
    strengths: strengths.iter().map(|s| (*s).to_string()).collect(),
    weaknesses: weaknesses.iter().map(|s| (*s).to_string()).collect(),
    ..KnowledgeArea::new(name, proficiency, now)
  };
  Student {
    id: DEMO_STUDENT_ID.into(),
    name: "Estudiante Demo".into(),
    email: "demo@example.com".into(),
    knowledge_areas: vec![
      area(
        Subject::Historia.area_name(),
        65.0,
        &["Revolución Industrial", "Guerras Mundiales"],
        &["Historia Antigua", "Civilizaciones Mesoamericanas"],
      ),
      area(
        Subject::Geografia.area_name(),
        78.0,
        &["Geografía de América", "Hidrografía"],
        &["Geografía Política", "Demografía"],
      ),
    ],
    assessment_history: Vec::new(),
    version: 0,
  }
}
