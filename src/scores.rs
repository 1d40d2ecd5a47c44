//! Translation of internal PHRP score column names to the score names
//! downstream pepXML consumers expect on `search_score` elements.

/// Map an internal score name to its pepXML-standard equivalent, or `None`
/// when the name should pass through verbatim.
pub fn translate_score_name(name: &str) -> Option<&'static str> {
    let translated = match name {
        // SEQUEST
        "XCorr" => "xcorr",
        "DelCn" => "deltacn",
        "DelCn2" => "deltacnstar",
        "Sp" => "spscore",
        "RankSp" => "sprank",
        "RankXc" => "xcorr_rank",
        "XcRatio" => "xcorr_ratio",
        "Ions_Observed" => "num_matched_ions",
        "Ions_Expected" => "tot_num_ions",
        // X!Tandem
        "Peptide_Hyperscore" => "hyperscore",
        "Peptide_Expectation_Value_Log(e)" => "expect",
        "Peptide_Expectation_Value_LogE" => "expect",
        "y_score" => "yscore",
        "b_score" => "bscore",
        // Inspect
        "MQScore" => "mqscore",
        "TotalPRMScore" => "totalprmscore",
        "FScore" => "fscore",
        "DeltaScore" => "deltascore",
        "DeltaScoreOther" => "deltascoreother",
        "PValue" => "pvalue",
        // MS-GF+ / MSGFDB
        "DeNovoScore" => "denovoscore",
        "MSGFScore" => "msgfscore",
        "MSGFDB_SpecProb" => "specprob",
        "MSGFDB_SpecEValue" => "specevalue",
        "MSGF_SpecEValue" => "specevalue",
        "EValue" => "evalue",
        "PepQValue" => "pepqvalue",
        "QValue" => "qvalue",
        _ => return None,
    };
    Some(translated)
}

/// The pepXML score name for `name`, falling back to the internal name when
/// no mapping exists.
pub fn score_name_or_verbatim(name: &str) -> &str {
    translate_score_name(name).unwrap_or(name)
}
