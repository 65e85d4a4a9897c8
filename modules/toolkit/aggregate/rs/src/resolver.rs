use std::io::BufRead;
use std::path::Path;

use ahash::{HashMap, HashMapExt};
use riboprof_io_rs::gff;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::window::{Convention, GeneWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Body,
    Utr5,
    Utr3,
}

#[derive(Debug, Default)]
struct Group {
    primary_id: String,
    secondary_id: Option<String>,
    body: Vec<gff::Record>,
    utr5: Vec<gff::Record>,
    utr3: Vec<gff::Record>,
}

/// Turns annotation records into one window per gene.
pub struct GeneModelResolver<'c> {
    config: &'c Config,
    convention: Convention,
}

impl<'c> GeneModelResolver<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self {
            config,
            convention: Convention::from_config(config),
        }
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// Resolve a GFF3 file, plain or gzipped.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> Result<Vec<GeneWindow>> {
        let path = path.as_ref();
        let reader = gff::Reader::from_path(path)
            .map_err(|err| Error::annotation(path.display().to_string(), format!("{err:#}")))?;
        self.resolve_reader(reader, &path.display().to_string())
    }

    pub fn resolve_reader<R: BufRead>(
        &self,
        mut reader: gff::Reader<R>,
        subject: &str,
    ) -> Result<Vec<GeneWindow>> {
        let mut records = Vec::new();
        reader
            .read_to_end(&mut records)
            .map_err(|err| Error::annotation(subject, format!("{err:#}")))?;
        self.resolve(records)
    }

    fn role(&self, feature: &str) -> Option<Role> {
        if feature == self.config.feature_type() {
            Some(Role::Body)
        } else if self.convention != Convention::ThreeFeature {
            None
        } else if feature == self.config.utr5_type() {
            Some(Role::Utr5)
        } else if feature == self.config.utr3_type() {
            Some(Role::Utr3)
        } else {
            None
        }
    }

    /// Group records by the primary identifier and build windows in order of first appearance.
    pub fn resolve(&self, records: impl IntoIterator<Item = gff::Record>) -> Result<Vec<GeneWindow>> {
        let primary_field = self.config.primary_id_field().as_str();
        let secondary_field = self.config.secondary_id_field().as_deref();

        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let (mut unnamed, mut unrelated) = (0usize, 0usize);

        for record in records {
            let role = match self.role(record.feature()) {
                Some(role) => role,
                None => {
                    unrelated += 1;
                    continue;
                }
            };
            let primary_id = match record.attribute(primary_field) {
                Some(id) => id,
                None => {
                    unnamed += 1;
                    continue;
                }
            };
            validate_id(primary_id)?;

            let ind = match index.get(primary_id) {
                Some(ind) => *ind,
                None => {
                    index.insert(primary_id.to_owned(), groups.len());
                    groups.push(Group {
                        primary_id: primary_id.to_owned(),
                        ..Group::default()
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[ind];

            if let Some(secondary) = secondary_field.and_then(|field| record.attribute(field)) {
                match &group.secondary_id {
                    Some(existing) if existing != secondary => {
                        return Err(Error::annotation(
                            &group.primary_id,
                            format!("conflicting secondary identifiers: {existing} and {secondary}"),
                        ));
                    }
                    Some(_) => {}
                    None => group.secondary_id = Some(secondary.to_owned()),
                }
            }

            match role {
                Role::Body => group.body.push(record),
                Role::Utr5 => group.utr5.push(record),
                Role::Utr3 => group.utr3.push(record),
            }
        }

        if unnamed > 0 {
            log::debug!("Skipped {unnamed} annotation records without the {primary_field} attribute");
        }
        if unrelated > 0 {
            log::debug!("Skipped {unrelated} annotation records of unrelated feature types");
        }

        let windows = groups
            .into_iter()
            .map(|group| self.window(group))
            .collect::<Result<Vec<_>>>()?;
        self.check_aliases(windows)
    }

    fn single<'a>(&self, id: &str, kind: &str, records: &'a [gff::Record]) -> Result<&'a gff::Record> {
        match records {
            [record] => Ok(record),
            [] => Err(Error::annotation(id, format!("missing {kind} feature"))),
            _ => Err(Error::annotation(
                id,
                format!(
                    "{} {kind} features, expected exactly one (at {})",
                    records.len(),
                    records
                        .iter()
                        .map(|x| format!("{}:{}-{}", x.seqid(), x.start(), x.end()))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
        }
    }

    fn window(&self, group: Group) -> Result<GeneWindow> {
        let id = group.primary_id.as_str();
        let body = self.single(id, self.config.feature_type(), &group.body)?;
        let feature = (body.start() as usize, body.end() as usize);

        let (utr5, utr3) = match self.convention {
            Convention::ThreeFeature => {
                let utr5 = self.single(id, self.config.utr5_type(), &group.utr5)?;
                let utr3 = self.single(id, self.config.utr3_type(), &group.utr3)?;
                for utr in [utr5, utr3] {
                    if utr.seqid() != body.seqid() {
                        return Err(Error::annotation(
                            id,
                            format!(
                                "{} lies on {}, but the {} lies on {}",
                                utr.feature(),
                                utr.seqid(),
                                body.feature(),
                                body.seqid()
                            ),
                        ));
                    }
                }
                (
                    (utr5.start() as usize, utr5.end() as usize),
                    (utr3.start() as usize, utr3.end() as usize),
                )
            }
            Convention::SingleFeature { buffer, .. } => {
                ((1, buffer), (feature.1 + 1, feature.1 + buffer))
            }
        };

        let secondary_id = match group.secondary_id {
            Some(secondary) if secondary == group.primary_id => {
                log::debug!("Secondary identifier of {id} equals the primary one, no alias is created");
                None
            }
            secondary => secondary,
        };

        GeneWindow::new(
            id,
            secondary_id,
            body.seqid().as_str(),
            utr5,
            feature,
            utr3,
            self.convention.stop_codon_offset(),
        )
    }

    fn check_aliases(&self, windows: Vec<GeneWindow>) -> Result<Vec<GeneWindow>> {
        let mut owners: HashMap<&str, &str> = HashMap::with_capacity(windows.len());
        for window in &windows {
            owners.insert(window.primary_id(), window.primary_id());
        }

        for window in &windows {
            let Some(secondary) = window.secondary_id() else {
                continue;
            };
            validate_id(secondary)?;
            if let Some(owner) = owners.insert(secondary, window.primary_id()) {
                let reason = if owner == secondary {
                    format!("secondary identifier {secondary} is also a primary identifier")
                } else {
                    format!("secondary identifier {secondary} is already used by {owner}")
                };
                return Err(Error::annotation(window.primary_id(), reason));
            }
        }
        Ok(windows)
    }
}

/// Identifiers become container path components.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') || id == "." || id == ".." {
        return Err(Error::annotation(
            id,
            "gene identifiers must be non-empty and must not contain '/'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn resolve(config: &Config, content: &str) -> Result<Vec<GeneWindow>> {
        let reader = gff::Reader::new(Cursor::new(content.to_owned()));
        GeneModelResolver::new(config).resolve_reader(reader, "test.gff3")
    }

    fn three_feature() -> Config {
        Config::builder("sample")
            .with_secondary_id_field(Some("Alias".to_owned()))
            .build()
            .unwrap()
    }

    const THREE_FEATURE: &str = "\
##gff-version 3
YAL001C\tsrc\tUTR5\t1\t250\t.\t+\t.\tName=YAL001C
YAL001C\tsrc\tCDS\t251\t500\t.\t+\t0\tName=YAL001C;Alias=TFC3
YAL001C\tsrc\tUTR3\t501\t750\t.\t+\t.\tName=YAL001C
YAL002W\tsrc\tUTR5\t1\t100\t.\t+\t.\tName=YAL002W
YAL002W\tsrc\tCDS\t101\t400\t.\t+\t0\tName=YAL002W
YAL002W\tsrc\tUTR3\t401\t500\t.\t+\t.\tName=YAL002W
YAL002W\tsrc\tgene\t1\t500\t.\t+\t.\tName=YAL002W
YAL002W\tsrc\tCDS\t101\t400\t.\t+\t0\tID=unnamed
";

    #[test]
    fn test_three_feature_mode() -> Result<()> {
        let windows = resolve(&three_feature(), THREE_FEATURE)?;
        assert_eq!(windows.len(), 2);

        let first = &windows[0];
        assert_eq!(first.primary_id(), "YAL001C");
        assert_eq!(first.secondary_id().as_deref(), Some("TFC3"));
        assert_eq!(first.sequence(), "YAL001C");
        assert_eq!((*first.utr5_start(), *first.utr5_end()), (1, 250));
        assert_eq!((*first.feature_start(), *first.feature_end()), (251, 500));
        assert_eq!((*first.utr3_start(), *first.utr3_end()), (501, 750));
        assert_eq!(*first.stop_codon_offset(), 2);
        assert_eq!(first.buffer_left(), 250);

        let second = &windows[1];
        assert_eq!(second.primary_id(), "YAL002W");
        assert_eq!(*second.secondary_id(), None);
        assert_eq!(second.buffer_left(), 100);
        Ok(())
    }

    #[test]
    fn test_single_feature_mode() -> Result<()> {
        let content = "\
YAL003W\tsrc\tCDS\t251\t496\t.\t+\t0\tName=YAL003W
YAL003W\tsrc\tUTR5\t1\t10\t.\t+\t.\tName=YAL003W
YAL005C\tsrc\tCDS\t251\t1000\t.\t+\t0\tName=YAL005C
";
        for (stop_in_feature, offset, stop) in [(false, -1, [497, 498, 499]), (true, 2, [494, 495, 496])] {
            let config = Config::builder("sample")
                .with_three_feature_mode(false)
                .with_buffer(250)
                .with_stop_codon_in_feature(stop_in_feature)
                .build()?;
            let windows = resolve(&config, content)?;
            assert_eq!(windows.len(), 2);

            let window = &windows[0];
            assert_eq!((*window.utr5_start(), *window.utr5_end()), (1, 250));
            assert_eq!((*window.utr3_start(), *window.utr3_end()), (497, 746));
            assert_eq!(*window.stop_codon_offset(), offset);
            assert_eq!(window.stop_codon_pos(), stop);
            assert_eq!(window.buffer_left(), 250);
            assert_eq!(window.buffer_right(), 746 - stop[2]);
        }
        Ok(())
    }

    #[test]
    fn test_annotation_errors() {
        let config = three_feature();
        for (content, subject) in [
            // Missing body
            ("A\ts\tUTR5\t1\t10\t.\t+\t.\tName=A\nA\ts\tUTR3\t21\t30\t.\t+\t.\tName=A\n", "A"),
            // Missing UTR3
            ("A\ts\tUTR5\t1\t10\t.\t+\t.\tName=A\nA\ts\tCDS\t11\t20\t.\t+\t.\tName=A\n", "A"),
            // Ambiguous body
            (
                "A\ts\tUTR5\t1\t10\t.\t+\t.\tName=A\nA\ts\tCDS\t11\t20\t.\t+\t.\tName=A\n\
                 A\ts\tCDS\t11\t20\t.\t+\t.\tName=A\nA\ts\tUTR3\t21\t30\t.\t+\t.\tName=A\n",
                "A",
            ),
            // UTR on another sequence
            (
                "A\ts\tUTR5\t1\t10\t.\t+\t.\tName=A\nA\ts\tCDS\t11\t20\t.\t+\t.\tName=A\n\
                 B\ts\tUTR3\t21\t30\t.\t+\t.\tName=A\n",
                "A",
            ),
            // Overlapping features
            (
                "A\ts\tUTR5\t1\t15\t.\t+\t.\tName=A\nA\ts\tCDS\t11\t20\t.\t+\t.\tName=A\n\
                 A\ts\tUTR3\t21\t30\t.\t+\t.\tName=A\n",
                "A",
            ),
            // Unparseable line
            ("A\ts\tCDS\tone\t20\t.\t+\t.\tName=A\n", "test.gff3"),
        ] {
            match resolve(&config, content) {
                Err(Error::Annotation { subject: found, .. }) => assert_eq!(found, subject, "{content}"),
                other => panic!("Unexpected result for {content}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_alias_collisions() {
        let config = three_feature();
        let gene = |name: &str, alias: &str, seq: &str| {
            format!(
                "{seq}\ts\tUTR5\t1\t10\t.\t+\t.\tName={name}\n\
                 {seq}\ts\tCDS\t11\t20\t.\t+\t.\tName={name};Alias={alias}\n\
                 {seq}\ts\tUTR3\t21\t30\t.\t+\t.\tName={name}\n"
            )
        };

        // Alias equal to another primary identifier
        let content = gene("A", "B", "chrA") + &gene("B", "X", "chrB");
        assert!(matches!(resolve(&config, &content), Err(Error::Annotation { .. })));

        // Two genes sharing an alias
        let content = gene("A", "X", "chrA") + &gene("B", "X", "chrB");
        assert!(matches!(resolve(&config, &content), Err(Error::Annotation { .. })));

        // Conflicting aliases within one gene
        let content = gene("A", "X", "chrA").replace("Name=A\n", "Name=A;Alias=Y\n");
        assert!(matches!(resolve(&config, &content), Err(Error::Annotation { .. })));

        // Alias equal to the own primary identifier is dropped
        let windows = resolve(&config, &gene("A", "A", "chrA")).unwrap();
        assert_eq!(*windows[0].secondary_id(), None);
    }

    #[test]
    fn test_first_appearance_order() -> Result<()> {
        let config = Config::builder("sample").with_three_feature_mode(false).build()?;
        let content = "\
chr\ts\tCDS\t300\t400\t.\t+\t.\tName=Z
chr\ts\tCDS\t300\t400\t.\t+\t.\tName=A
chr\ts\tCDS\t300\t400\t.\t+\t.\tName=M
";
        let ids = resolve(&config, content)?
            .iter()
            .map(|x| x.primary_id().clone())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["Z", "A", "M"]);
        Ok(())
    }
}
